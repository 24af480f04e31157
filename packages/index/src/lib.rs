#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tantivy-backed reverse geocoder index.
//!
//! Resolves a latitude/longitude to the name of the city whose boundary
//! contains it, falling back to the nearest known place.
//!
//! # Architecture
//!
//! - **Index time**: one document per shape boundary is written and
//!   committed. Supplemental points (postal-code centroids) are then
//!   probed against the committed shapes: points no shape covers become
//!   point documents, points covered by one shape are dropped, and points
//!   covered by several shapes abort the build. The result is merged into
//!   a single segment and moved into place.
//! - **Query time**: the stored documents are loaded into in-memory
//!   R-trees when the index is opened. A query first looks for a
//!   containing shape, then for the nearest shape anchor or point.
//! - **Caching**: [`SearcherCache`] keeps at most one open [`Searcher`]
//!   per index directory.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use revgeo_index::SearcherCache;
//!
//! let cache = SearcherCache::new();
//! let searcher = cache.get_or_open("indices")?;
//! let result = searcher.search(48.1374, 11.5755)?;
//! if let Some(city) = result.city() {
//!     println!("{city} ({})", result.match_kind().relation());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod indexer;
pub mod progress;
pub mod schema;
pub mod searcher;
pub mod snapshot;
pub mod source;
pub mod verify;

pub use cache::SearcherCache;
pub use indexer::{BuildConfig, build_index};
pub use revgeo_index_models::{
    GeoPoint, IndexStats, IndexerConfig, LatLon, MatchKind, PointCatalogFormat, SearchHit,
    SearchResponse, SearchResult, ShapeDefinition,
};
pub use searcher::Searcher;
pub use source::{DirectorySource, GeometrySource};

use revgeo_spatial::GeometryError;

use catalog::CatalogError;

/// Errors from reverse geocoder index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Tantivy error.
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Shape or point catalog error.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A shape's boundary document could not be parsed.
    #[error("Invalid geometry for shape {shape}: {source}")]
    Geometry {
        /// Id of the shape.
        shape: String,
        /// Parser error.
        #[source]
        source: GeometryError,
    },

    /// A shape has no boundary document.
    #[error("Geometry file for shape {shape} not found: {path}")]
    GeometryFileMissing {
        /// Id of the shape.
        shape: String,
        /// Where the document was expected.
        path: String,
    },

    /// A supplemental point lies within more than one shape.
    #[error("Point {point} ({lat}, {lon}) lies within several shapes: {}", .cities.join(", "))]
    Overlap {
        /// Name of the point.
        point: String,
        /// Latitude of the point.
        lat: f64,
        /// Longitude of the point.
        lon: f64,
        /// Every shape containing the point, in index order.
        cities: Vec<String>,
    },

    /// The index could not be opened or read.
    #[error("Index at {path} unavailable: {reason}")]
    Unavailable {
        /// Index directory.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A stored document is missing a required field.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// The configuration file is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Async task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use revgeo_index_models::{GeoPoint, ShapeDefinition};

    use crate::progress::null_progress;
    use crate::{BuildConfig, GeometrySource, IndexError, IndexStats, build_index};

    pub const TEST_HEAP_BYTES: usize = 20_000_000;

    /// Empty per-process scratch directory path.
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("revgeo_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    /// A rectangular boundary as a `GeoJSON` feature.
    pub fn rectangle(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"name":"test"}},"geometry":{{"type":"Polygon","coordinates":[[[{min_lon},{min_lat}],[{max_lon},{min_lat}],[{max_lon},{max_lat}],[{min_lon},{max_lat}],[{min_lon},{min_lat}]]]}}}}"#
        )
    }

    pub fn shape(id: &str) -> ShapeDefinition {
        ShapeDefinition {
            id: id.to_string(),
            url: format!("https://polygons.example.org/{id}"),
            filename: ShapeDefinition::default_filename(id),
            explicit_points: Vec::new(),
        }
    }

    pub fn point(name: &str, lat: f64, lon: f64) -> GeoPoint {
        GeoPoint {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    /// Boundary documents held in memory, keyed by file name.
    #[derive(Default)]
    pub struct MemorySource {
        documents: BTreeMap<String, String>,
    }

    impl MemorySource {
        pub fn insert(&mut self, filename: &str, document: impl Into<String>) {
            self.documents.insert(filename.to_string(), document.into());
        }
    }

    impl GeometrySource for MemorySource {
        fn read_boundary(&self, shape: &ShapeDefinition) -> Result<String, IndexError> {
            self.documents
                .get(&shape.filename)
                .cloned()
                .ok_or_else(|| IndexError::GeometryFileMissing {
                    shape: shape.id.clone(),
                    path: shape.filename.clone(),
                })
        }
    }

    pub struct Fixture {
        pub shapes: Vec<ShapeDefinition>,
        pub points: Vec<GeoPoint>,
        pub source: MemorySource,
    }

    impl Fixture {
        pub fn add_shape(&mut self, id: &str, document: impl Into<String>) {
            let shape = shape(id);
            self.source.insert(&shape.filename, document);
            self.shapes.push(shape);
        }

        pub fn build(&self, dir: &Path) -> Result<IndexStats, IndexError> {
            build_index(
                dir,
                BuildConfig {
                    shapes: &self.shapes,
                    points: &self.points,
                    geometry: &self.source,
                    writer_heap_bytes: TEST_HEAP_BYTES,
                    progress: null_progress(),
                },
            )
        }
    }

    /// Two Bavarian shapes and three supplemental points: Planegg lies
    /// just west of the München rectangle, the München centre point is
    /// covered by it and Forst is far away in Brandenburg.
    pub fn bavaria() -> Fixture {
        let mut fixture = Fixture {
            shapes: Vec::new(),
            points: vec![
                point("Planegg", 48.1028, 11.4230),
                point("München", 48.1374, 11.5755),
                point("Forst (Lausitz)", 51.7447, 14.6243),
            ],
            source: MemorySource::default(),
        };
        fixture.add_shape("München", rectangle(48.05, 48.25, 11.45, 11.75));
        fixture.add_shape("Unterschleißheim", rectangle(48.26, 48.30, 11.54, 11.60));
        fixture
    }
}
