#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the reverse geocoder index.
//!
//! This crate contains only data types, configuration structs, and simple
//! conversions. It has no heavyweight dependencies (no Tantivy, no I/O).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A coordinate pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl LatLon {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A shape row from the shape catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDefinition {
    /// City name, also used as the indexed city value.
    pub id: String,
    /// Where the boundary document is downloaded from.
    pub url: String,
    /// Local file name of the boundary document.
    pub filename: String,
    /// Known coordinates inside the shape, used for verification.
    #[serde(default)]
    pub explicit_points: Vec<LatLon>,
}

impl ShapeDefinition {
    /// File name used when the catalog leaves the column blank.
    #[must_use]
    pub fn default_filename(id: &str) -> String {
        format!("{}.json", id.to_lowercase())
    }
}

/// A supplemental named location, e.g. a postal-code centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// City name.
    pub name: String,
    /// Latitude (WGS84).
    pub lat: f64,
    /// Longitude (WGS84).
    pub lon: f64,
}

/// Which search tier produced (or last attempted) a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// The coordinate lies within an indexed shape.
    Shape,
    /// The coordinate was resolved to the nearest indexed point.
    Point,
}

impl MatchKind {
    /// Word used when describing a hit to a human.
    #[must_use]
    pub const fn relation(self) -> &'static str {
        match self {
            Self::Shape => "within",
            Self::Point => "nearby",
        }
    }
}

/// Outcome of the two-tier search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "city", rename_all = "lowercase")]
pub enum SearchHit {
    /// A shape contains the coordinate.
    Shape(String),
    /// No shape contains the coordinate; this is the nearest point.
    Point(String),
    /// Nothing was found. Only possible when the index has no points.
    Empty,
}

impl SearchHit {
    /// The matched city, if any.
    #[must_use]
    pub fn city(&self) -> Option<&str> {
        match self {
            Self::Shape(city) | Self::Point(city) => Some(city),
            Self::Empty => None,
        }
    }

    /// The tier that produced this hit. An empty hit reports the point
    /// tier, since that is the last one attempted.
    #[must_use]
    pub const fn match_kind(&self) -> MatchKind {
        match self {
            Self::Shape(_) => MatchKind::Shape,
            Self::Point(_) | Self::Empty => MatchKind::Point,
        }
    }
}

/// A reverse geocoding result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// What was found.
    pub hit: SearchHit,
    /// Wall-clock time of the whole search.
    pub elapsed: Duration,
}

impl SearchResult {
    #[must_use]
    pub fn city(&self) -> Option<&str> {
        self.hit.city()
    }

    #[must_use]
    pub const fn match_kind(&self) -> MatchKind {
        self.hit.match_kind()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.hit, SearchHit::Empty)
    }

    /// Elapsed time in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Transport-neutral view of a [`SearchResult`] for handlers that
/// serialize responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Matched city, `null` when nothing was found.
    pub city: Option<String>,
    /// Tier that matched or was last attempted.
    pub match_kind: MatchKind,
    /// Search time in milliseconds.
    pub elapsed_ms: u64,
}

impl From<&SearchResult> for SearchResponse {
    fn from(result: &SearchResult) -> Self {
        Self {
            city: result.city().map(str::to_string),
            match_kind: result.match_kind(),
            elapsed_ms: result.elapsed_ms(),
        }
    }
}

/// Column layout of a tab- or comma-separated point file.
///
/// Column numbers are zero-based. The default matches the OpenGeoDB
/// `DE.tab` export, where the header line is a `#` comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCatalogFormat {
    /// Field delimiter.
    pub delimiter: char,
    /// Whether the first non-comment row is a header.
    pub has_header: bool,
    /// Column holding the place name.
    pub name_column: usize,
    /// Column holding the latitude.
    pub lat_column: usize,
    /// Column holding the longitude.
    pub lon_column: usize,
    /// Further columns that must be non-blank for a row to be kept.
    pub required_columns: Vec<usize>,
}

impl Default for PointCatalogFormat {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            has_header: false,
            name_column: 3,
            lat_column: 4,
            lon_column: 5,
            // postal code
            required_columns: vec![7],
        }
    }
}

/// Configuration for building an index.
///
/// Every field has a default, so a TOML file only needs the values that
/// differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Shape catalog CSV.
    pub shapes_csv: String,
    /// Supplemental point file.
    pub points_file: String,
    /// Directory containing one boundary document per shape.
    pub geometry_dir: String,
    /// Directory the index is written to.
    pub index_dir: String,

    /// Memory budget for the Tantivy `IndexWriter` in bytes.
    /// Defaults to 50 MB.
    pub writer_heap_bytes: usize,

    /// Layout of `points_file`.
    pub point_format: PointCatalogFormat,
}

const fn default_writer_heap() -> usize {
    50 * 1024 * 1024 // 50 MB
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            shapes_csv: "shapes.csv".to_string(),
            points_file: "DE.tab".to_string(),
            geometry_dir: "downloads".to_string(),
            index_dir: "indices".to_string(),
            writer_heap_bytes: default_writer_heap(),
            point_format: PointCatalogFormat::default(),
        }
    }
}

/// Statistics about a built index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Shape documents written.
    pub shapes_indexed: u64,
    /// Shapes indexed without a representative point.
    pub shapes_without_anchor: u64,
    /// Catalog rows skipped for having no id.
    pub shapes_skipped: u64,
    /// Point documents written by the enrichment pass.
    pub points_indexed: u64,
    /// Points skipped because a shape already covers them.
    pub points_skipped: u64,
    /// Total number of documents in the index.
    pub total_documents: u64,
    /// Index size on disk in bytes.
    pub index_size_bytes: u64,
    /// Time taken to build the index in seconds.
    pub build_time_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hit_reports_point_tier() {
        assert_eq!(SearchHit::Empty.match_kind(), MatchKind::Point);
        assert_eq!(SearchHit::Empty.city(), None);
        assert_eq!(
            SearchHit::Shape("Köln".to_string()).match_kind(),
            MatchKind::Shape
        );
    }

    #[test]
    fn response_serializes_for_handlers() {
        let result = SearchResult {
            hit: SearchHit::Point("Planegg".to_string()),
            elapsed: Duration::from_micros(2_500),
        };
        let json = serde_json::to_value(SearchResponse::from(&result)).unwrap();
        assert_eq!(json["city"], "Planegg");
        assert_eq!(json["match_kind"], "point");
        assert_eq!(json["elapsed_ms"], 2);

        let empty = SearchResult {
            hit: SearchHit::Empty,
            elapsed: Duration::ZERO,
        };
        let json = serde_json::to_value(SearchResponse::from(&empty)).unwrap();
        assert!(json["city"].is_null());
    }

    #[test]
    fn default_filename_is_lowercased_id() {
        assert_eq!(ShapeDefinition::default_filename("München"), "münchen.json");
    }

    #[test]
    fn default_point_format_matches_opengeodb() {
        let format = PointCatalogFormat::default();
        assert_eq!(format.delimiter, '\t');
        assert_eq!(
            (format.name_column, format.lat_column, format.lon_column),
            (3, 4, 5)
        );
    }
}
