//! Two-tier reverse geocoding over an opened index.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use revgeo_index_models::{SearchHit, SearchResult};
use tantivy::{Index, IndexReader, ReloadPolicy};

use crate::IndexError;
use crate::schema::IndexFields;
use crate::snapshot::{IndexSnapshot, SnapshotCounts};

/// A handle to an opened index for searching.
///
/// Immutable after [`Searcher::open`]; share it between threads with an
/// [`Arc`]. The underlying files stay open until the last reference is
/// dropped.
pub struct Searcher {
    path: PathBuf,
    // Keeps the index generation the snapshot was loaded from alive.
    _reader: IndexReader,
    searcher: tantivy::Searcher,
    snapshot: IndexSnapshot,
}

impl Searcher {
    /// Opens an index previously written by [`crate::build_index`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the directory does not exist
    /// or does not hold a readable index.
    pub fn open(index_dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = index_dir.as_ref().to_path_buf();
        let unavailable = |reason: String| IndexError::Unavailable {
            path: path.display().to_string(),
            reason,
        };

        if !path.is_dir() {
            return Err(unavailable("directory not found".to_string()));
        }

        log::info!("Opening index at {}", path.display());

        let index = Index::open_in_dir(&path).map_err(|e| unavailable(e.to_string()))?;
        let fields =
            IndexFields::from_schema(&index.schema()).map_err(|e| unavailable(e.to_string()))?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| unavailable(e.to_string()))?;
        let searcher = reader.searcher();
        let snapshot =
            IndexSnapshot::load(&searcher, &fields).map_err(|e| unavailable(e.to_string()))?;

        Ok(Self {
            path,
            _reader: reader,
            searcher,
            snapshot,
        })
    }

    /// Resolves a coordinate to a city and times the lookup.
    ///
    /// A containing shape wins; otherwise the nearest shape anchor or
    /// point is returned. There is no distance limit, so only an index
    /// without any points or anchors yields [`SearchHit::Empty`]. A NaN
    /// or infinite coordinate lies nowhere and also yields
    /// [`SearchHit::Empty`].
    ///
    /// # Errors
    ///
    /// None for an opened index: every city is held in memory. The
    /// `Result` matches [`Searcher::search_async`].
    pub fn search(&self, lat: f64, lon: f64) -> Result<SearchResult, IndexError> {
        let start = Instant::now();
        let hit = self.resolve(lat, lon);
        Ok(SearchResult {
            hit,
            elapsed: start.elapsed(),
        })
    }

    /// Async wrapper around [`Searcher::search`], dispatched to the
    /// blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails or the task panics.
    pub async fn search_async(
        self: &Arc<Self>,
        lat: f64,
        lon: f64,
    ) -> Result<SearchResult, IndexError> {
        let searcher = Arc::clone(self);
        tokio::task::spawn_blocking(move || searcher.search(lat, lon)).await?
    }

    fn resolve(&self, lat: f64, lon: f64) -> SearchHit {
        if !lat.is_finite() || !lon.is_finite() {
            log::debug!("({lat}, {lon}) is not a finite coordinate");
            return SearchHit::Empty;
        }

        if let Some(city) = self.snapshot.first_containing(lat, lon) {
            log::debug!("({lat}, {lon}) is within {city}");
            return SearchHit::Shape(city.to_string());
        }

        let Some(nearest) = self.snapshot.nearest(lat, lon) else {
            log::debug!("({lat}, {lon}): index has no points");
            return SearchHit::Empty;
        };
        log::debug!(
            "({lat}, {lon}) is nearest to {} ({:.1} km)",
            nearest.payload,
            nearest.distance_km
        );
        SearchHit::Point(nearest.payload.to_string())
    }

    /// Every city whose shape contains the coordinate, in index order.
    #[must_use]
    pub fn containing(&self, lat: f64, lon: f64) -> Vec<String> {
        self.snapshot
            .containing(lat, lon)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Returns the total number of documents in the index.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    #[must_use]
    pub const fn counts(&self) -> SnapshotCounts {
        self.snapshot.counts()
    }

    /// Directory this index was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the index.
    pub fn close(self) {
        log::debug!("Closing index at {}", self.path.display());
    }
}
