//! Index construction.
//!
//! A build writes into a staging directory next to the target and only
//! replaces the target once every phase has succeeded. The previous index
//! is moved aside before the staging directory is renamed into place and
//! is deleted only after that rename succeeded. A failed build leaves any
//! previous index untouched.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use revgeo_index_models::{GeoPoint, IndexStats, ShapeDefinition};
use tantivy::indexer::NoMergePolicy;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::IndexError;
use crate::catalog::{self, CatalogError};
use crate::progress::ProgressCallback;
use crate::schema::{self, IndexFields, IndexedDocument};
use crate::snapshot::IndexSnapshot;
use crate::source::GeometrySource;

/// Suffix of the staging directory a build writes into.
pub const STAGING_SUFFIX: &str = ".building";

/// Suffix the previous index is moved to while a build is swapped in.
pub const PREVIOUS_SUFFIX: &str = ".previous";

/// Inputs for building an index.
pub struct BuildConfig<'a> {
    /// Shape definitions, in index order.
    pub shapes: &'a [ShapeDefinition],
    /// Supplemental points, in index order.
    pub points: &'a [GeoPoint],
    /// Where boundary documents are read from.
    pub geometry: &'a dyn GeometrySource,
    /// Tantivy writer heap size in bytes.
    pub writer_heap_bytes: usize,
    /// Progress reporting.
    pub progress: Arc<dyn ProgressCallback>,
}

/// Builds a reverse geocoder index at `index_dir`.
///
/// 0. Rejects duplicate shape ids, filenames or urls
/// 1. Adds one document per shape with a non-empty id, then commits
/// 2. Probes every supplemental point against the committed shapes and
///    adds the uncovered ones, then commits
/// 3. Merges all segments into one
/// 4. Replaces `index_dir` with the result
///
/// # Errors
///
/// Returns [`CatalogError::Duplicates`] before anything is written if
/// two shapes share a key. Otherwise returns an error if a boundary
/// document is missing or invalid, a point lies within more than one
/// shape, or index writing fails. The staging directory is removed in
/// every error case.
pub fn build_index(index_dir: &Path, config: BuildConfig<'_>) -> Result<IndexStats, IndexError> {
    let start = Instant::now();

    let duplicates = catalog::find_duplicates(config.shapes);
    if !duplicates.is_empty() {
        log::error!("Refusing to build index: {duplicates}");
        return Err(CatalogError::Duplicates(duplicates).into());
    }

    let staging = sibling_dir(index_dir, STAGING_SUFFIX)?;

    if staging.exists() {
        log::info!("Removing stale staging directory {}", staging.display());
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let mut stats = match build_into(&staging, &config) {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("Index build failed: {e}");
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                log::warn!(
                    "Failed to remove staging directory {}: {cleanup}",
                    staging.display()
                );
            }
            return Err(e);
        }
    };

    replace_dir(&staging, index_dir)?;

    let elapsed = start.elapsed();
    stats.index_size_bytes = dir_size(index_dir).unwrap_or(0);
    stats.build_time_secs = elapsed.as_secs_f64();

    #[allow(clippy::cast_precision_loss)]
    let mb = stats.index_size_bytes as f64 / 1_048_576.0;
    log::info!(
        "Index built: {} documents ({} shapes, {} points), {mb:.1} MB, {:.1}s",
        stats.total_documents,
        stats.shapes_indexed,
        stats.points_indexed,
        stats.build_time_secs
    );

    Ok(stats)
}

/// `<index_dir><suffix>`, next to the target.
fn sibling_dir(index_dir: &Path, suffix: &str) -> Result<PathBuf, IndexError> {
    let name = index_dir.file_name().ok_or_else(|| {
        IndexError::Config(format!(
            "index directory {} has no final component",
            index_dir.display()
        ))
    })?;
    let mut sibling: OsString = name.to_os_string();
    sibling.push(suffix);
    Ok(index_dir.with_file_name(sibling))
}

/// Moves `staging` onto `index_dir`. An existing index is renamed aside
/// first and restored if the swap fails.
fn replace_dir(staging: &Path, index_dir: &Path) -> Result<(), IndexError> {
    if !index_dir.exists() {
        std::fs::rename(staging, index_dir)?;
        return Ok(());
    }

    let previous = sibling_dir(index_dir, PREVIOUS_SUFFIX)?;
    if previous.exists() {
        log::info!("Removing stale previous index {}", previous.display());
        std::fs::remove_dir_all(&previous)?;
    }

    log::info!("Replacing existing index at {}", index_dir.display());
    std::fs::rename(index_dir, &previous)?;

    if let Err(e) = std::fs::rename(staging, index_dir) {
        log::error!("Failed to move new index into place: {e}");
        if let Err(restore) = std::fs::rename(&previous, index_dir) {
            log::error!(
                "Failed to restore previous index from {}: {restore}",
                previous.display()
            );
        }
        if let Err(cleanup) = std::fs::remove_dir_all(staging) {
            log::warn!(
                "Failed to remove staging directory {}: {cleanup}",
                staging.display()
            );
        }
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_dir_all(&previous) {
        log::warn!(
            "Failed to remove previous index {}: {e}",
            previous.display()
        );
    }
    Ok(())
}

fn build_into(dir: &Path, config: &BuildConfig<'_>) -> Result<IndexStats, IndexError> {
    let schema = schema::build_schema();
    let index = Index::create_in_dir(dir, schema.clone())?;
    let fields = IndexFields::from_schema(&schema)?;

    let mut writer: IndexWriter = index.writer_with_num_threads(1, config.writer_heap_bytes)?;
    writer.set_merge_policy(Box::new(NoMergePolicy));

    let progress = &config.progress;
    progress.set_total((config.shapes.len() + config.points.len()) as u64);

    let mut stats = IndexStats::default();
    let mut ordinal = 0u64;

    // Phase 1: shapes
    log::info!("Indexing {} shapes", config.shapes.len());
    progress.set_message("Indexing shapes".to_string());
    for shape in config.shapes {
        progress.inc(1);
        if shape.id.is_empty() {
            log::warn!("Skipping shape without id (url: {:?})", shape.url);
            stats.shapes_skipped += 1;
            continue;
        }

        let document = config.geometry.read_boundary(shape)?;
        let boundary =
            revgeo_spatial::boundary::parse(&document).map_err(|source| IndexError::Geometry {
                shape: shape.id.clone(),
                source,
            })?;
        if boundary.representative_point.is_none() {
            log::warn!(
                "Shape {} has no representative point; it can only match by containment",
                shape.id
            );
            stats.shapes_without_anchor += 1;
        }

        let doc = IndexedDocument::Shape {
            city: shape.id.clone(),
            boundary,
        }
        .to_document(&fields, ordinal);
        writer.add_document(doc)?;
        ordinal += 1;
        stats.shapes_indexed += 1;
    }

    log::info!("Committing {} shapes...", stats.shapes_indexed);
    writer.commit()?;

    // Phase 2: enrichment against the committed shapes
    let reader: IndexReader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;
    let searcher = reader.searcher();
    let committed = IndexSnapshot::load(&searcher, &fields)?;

    log::info!("Probing {} supplemental points", config.points.len());
    progress.set_message("Adding points".to_string());
    for point in config.points {
        progress.inc(1);
        let covering = committed.containing(point.lat, point.lon);
        match covering.as_slice() {
            [] => {
                let doc = IndexedDocument::Point {
                    city: point.name.clone(),
                    lat: point.lat,
                    lon: point.lon,
                }
                .to_document(&fields, ordinal);
                writer.add_document(doc)?;
                ordinal += 1;
                stats.points_indexed += 1;
            }
            [_] => stats.points_skipped += 1,
            several => {
                let cities = several.iter().map(ToString::to_string).collect();
                return Err(IndexError::Overlap {
                    point: point.name.clone(),
                    lat: point.lat,
                    lon: point.lon,
                    cities,
                });
            }
        }
    }
    log::info!(
        "  {} points added, {} already covered by a shape",
        stats.points_indexed,
        stats.points_skipped
    );

    writer.commit()?;

    // Phase 3: compact
    let segment_ids = index.searchable_segment_ids()?;
    if segment_ids.len() > 1 {
        log::info!("Merging {} segments...", segment_ids.len());
        progress.set_message("Merging segments".to_string());
        writer.merge(&segment_ids).wait()?;
    }
    writer.wait_merging_threads()?;

    stats.total_documents = stats.shapes_indexed + stats.points_indexed;
    progress.finish(format!("Indexed {} documents", stats.total_documents));

    Ok(stats)
}

/// Recursively calculates the total size of a directory.
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            if ft.is_file() {
                total += entry.metadata()?.len();
            } else if ft.is_dir() {
                total += dir_size(&entry.path())?;
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use revgeo_index_models::{MatchKind, SearchHit};
    use tantivy::Index;

    use super::*;
    use crate::Searcher;
    use crate::test_support::{Fixture, MemorySource, bavaria, point, rectangle, scratch_dir};

    fn hit(searcher: &Searcher, lat: f64, lon: f64) -> SearchHit {
        searcher.search(lat, lon).unwrap().hit
    }

    #[test]
    fn builds_shapes_and_uncovered_points() {
        let dir = scratch_dir("build_scenarios");
        let stats = bavaria().build(&dir).unwrap();

        assert_eq!(stats.shapes_indexed, 2);
        assert_eq!(stats.points_indexed, 2);
        assert_eq!(stats.points_skipped, 1);
        assert_eq!(stats.total_documents, 4);
        assert!(stats.index_size_bytes > 0);

        let searcher = Searcher::open(&dir).unwrap();
        assert_eq!(searcher.num_docs(), 4);

        assert_eq!(
            hit(&searcher, 48.1374, 11.5755),
            SearchHit::Shape("München".to_string())
        );
        assert_eq!(
            hit(&searcher, 48.28, 11.57),
            SearchHit::Shape("Unterschleißheim".to_string())
        );
        assert_eq!(
            hit(&searcher, 48.1028, 11.4230),
            SearchHit::Point("Planegg".to_string())
        );
        assert_eq!(
            hit(&searcher, 48.11, 11.43),
            SearchHit::Point("Planegg".to_string())
        );
        assert_eq!(
            hit(&searcher, 51.70, 14.60),
            SearchHit::Point("Forst (Lausitz)".to_string())
        );

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn point_on_shape_edge_matches_shape() {
        let dir = scratch_dir("build_edge");
        bavaria().build(&dir).unwrap();
        let searcher = Searcher::open(&dir).unwrap();

        assert_eq!(
            hit(&searcher, 48.05, 11.60),
            SearchHit::Shape("München".to_string())
        );

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn far_away_query_returns_globally_nearest_point() {
        let dir = scratch_dir("build_far_away");
        bavaria().build(&dir).unwrap();
        let searcher = Searcher::open(&dir).unwrap();

        let result = searcher.search(0.0, 0.0).unwrap();
        assert_eq!(result.hit, SearchHit::Point("Planegg".to_string()));
        assert_eq!(result.match_kind(), MatchKind::Point);

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn point_in_overlapping_shapes_aborts_build() {
        let dir = scratch_dir("build_overlap");
        let mut fixture = bavaria();
        fixture.add_shape("Neuried", rectangle(48.00, 48.10, 11.40, 11.50));
        fixture.points.push(point("Fürstenried", 48.07, 11.47));

        let err = fixture.build(&dir).unwrap_err();
        match err {
            IndexError::Overlap { point, cities, .. } => {
                assert_eq!(point, "Fürstenried");
                assert_eq!(cities, ["München", "Neuried"]);
            }
            other => panic!("expected overlap, got {other}"),
        }

        assert!(!dir.exists());
        assert!(!sibling_dir(&dir, STAGING_SUFFIX).unwrap().exists());
    }

    #[test]
    fn failed_rebuild_keeps_previous_index() {
        let dir = scratch_dir("build_atomic");
        bavaria().build(&dir).unwrap();

        let mut broken = bavaria();
        broken.add_shape("Kaputt", "{ not geojson");
        let err = broken.build(&dir).unwrap_err();
        assert!(
            matches!(err, IndexError::Geometry { ref shape, .. } if shape == "Kaputt"),
            "{err}"
        );

        let searcher = Searcher::open(&dir).unwrap();
        assert_eq!(searcher.num_docs(), 4);
        assert!(!sibling_dir(&dir, STAGING_SUFFIX).unwrap().exists());

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_geometry_file_names_the_shape() {
        let dir = scratch_dir("build_missing_file");
        let mut fixture = bavaria();
        fixture.shapes.push(crate::test_support::shape("Helgoland"));

        let err = fixture.build(&dir).unwrap_err();
        assert!(
            matches!(
                err,
                IndexError::GeometryFileMissing { ref shape, .. } if shape == "Helgoland"
            ),
            "{err}"
        );
        assert!(!dir.exists());
    }

    #[test]
    fn shapes_without_id_are_skipped() {
        let dir = scratch_dir("build_empty_id");
        let mut fixture = bavaria();
        let mut unnamed = crate::test_support::shape("");
        unnamed.filename = "unnamed.json".to_string();
        fixture.shapes.push(unnamed);

        let stats = fixture.build(&dir).unwrap();
        assert_eq!(stats.shapes_skipped, 1);
        assert_eq!(stats.shapes_indexed, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn index_without_points_or_anchors_finds_nothing() {
        let dir = scratch_dir("build_empty");
        let fixture = Fixture {
            shapes: Vec::new(),
            points: Vec::new(),
            source: MemorySource::default(),
        };

        let stats = fixture.build(&dir).unwrap();
        assert_eq!(stats.total_documents, 0);

        let searcher = Searcher::open(&dir).unwrap();
        let result = searcher.search(48.1374, 11.5755).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.match_kind(), MatchKind::Point);

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn built_index_has_a_single_segment() {
        let dir = scratch_dir("build_merged");
        bavaria().build(&dir).unwrap();

        let index = Index::open_in_dir(&dir).unwrap();
        assert_eq!(index.searchable_segment_ids().unwrap().len(), 1);

        drop(index);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn duplicate_shapes_fail_before_indexing() {
        let dir = scratch_dir("build_duplicates");
        let mut fixture = bavaria();
        let again = fixture.shapes[0].clone();
        fixture.shapes.push(again);

        let err = fixture.build(&dir).unwrap_err();
        match err {
            IndexError::Catalog(CatalogError::Duplicates(duplicates)) => {
                assert_eq!(duplicates.ids, ["München"]);
                assert_eq!(duplicates.filenames, ["münchen.json"]);
            }
            other => panic!("expected duplicates, got {other}"),
        }

        assert!(!dir.exists());
        assert!(!sibling_dir(&dir, STAGING_SUFFIX).unwrap().exists());
    }

    #[test]
    fn rebuild_replaces_index_and_cleans_up() {
        let dir = scratch_dir("build_replace");
        let previous = sibling_dir(&dir, PREVIOUS_SUFFIX).unwrap();
        std::fs::create_dir_all(previous.join("stale")).unwrap();

        bavaria().build(&dir).unwrap();

        let mut extended = bavaria();
        extended.add_shape("Garching", rectangle(48.26, 48.30, 11.62, 11.70));
        let stats = extended.build(&dir).unwrap();
        assert_eq!(stats.shapes_indexed, 3);

        assert!(!previous.exists());
        assert!(!sibling_dir(&dir, STAGING_SUFFIX).unwrap().exists());

        let searcher = Searcher::open(&dir).unwrap();
        assert_eq!(
            hit(&searcher, 48.28, 11.66),
            SearchHit::Shape("Garching".to_string())
        );

        drop(searcher);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sibling_dirs_sit_next_to_target() {
        let target = Path::new("/srv/revgeo/indices");
        assert_eq!(
            sibling_dir(target, STAGING_SUFFIX).unwrap(),
            PathBuf::from("/srv/revgeo/indices.building")
        );
        assert_eq!(
            sibling_dir(target, PREVIOUS_SUFFIX).unwrap(),
            PathBuf::from("/srv/revgeo/indices.previous")
        );
        assert!(sibling_dir(Path::new("/"), STAGING_SUFFIX).is_err());
    }
}
