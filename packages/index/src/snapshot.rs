//! In-memory view of a committed index.
//!
//! Loads every live document of a Tantivy searcher into a [`ShapeTree`]
//! and a [`PointTree`]. Entries carry the document's city, so queries
//! never touch the document store. A shape and its anchor share one
//! allocation of the name.

use std::sync::Arc;

use revgeo_spatial::{NearestPoint, PointTree, ShapeTree};
use tantivy::{DocAddress, TantivyDocument};

use crate::IndexError;
use crate::schema::{IndexFields, IndexedDocument};

/// Document counts of a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub shapes: usize,
    pub shapes_without_anchor: usize,
    pub points: usize,
}

pub struct IndexSnapshot {
    shapes: ShapeTree<Arc<str>>,
    points: PointTree<Arc<str>>,
    counts: SnapshotCounts,
}

impl IndexSnapshot {
    /// Loads all live documents visible to `searcher`.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored document cannot be read or is
    /// missing required fields.
    pub fn load(searcher: &tantivy::Searcher, fields: &IndexFields) -> Result<Self, IndexError> {
        let mut shapes = Vec::new();
        let mut points = Vec::new();
        let mut counts = SnapshotCounts::default();

        for (segment_ord, segment_reader) in searcher.segment_readers().iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let segment_ord = segment_ord as u32;

            for doc_id in segment_reader.doc_ids_alive() {
                let address = DocAddress::new(segment_ord, doc_id);
                let doc: TantivyDocument = searcher.doc(address)?;
                let (ordinal, document) = IndexedDocument::from_document(&doc, fields)?;
                let city: Arc<str> = Arc::from(document.city());

                if let Some((lat, lon)) = document.position() {
                    points.push((Arc::clone(&city), ordinal, lat, lon));
                }
                match document {
                    IndexedDocument::Shape { boundary, .. } => {
                        counts.shapes += 1;
                        if boundary.representative_point.is_none() {
                            counts.shapes_without_anchor += 1;
                        }
                        shapes.push((city, ordinal, boundary.polygon));
                    }
                    IndexedDocument::Point { .. } => counts.points += 1,
                }
            }
        }

        log::debug!(
            "Loaded snapshot: {} shapes ({} without anchor), {} points",
            counts.shapes,
            counts.shapes_without_anchor,
            counts.points
        );

        Ok(Self {
            shapes: ShapeTree::bulk_load(shapes),
            points: PointTree::bulk_load(points),
            counts,
        })
    }

    /// Cities of every shape containing the coordinate, in index order.
    #[must_use]
    pub fn containing(&self, lat: f64, lon: f64) -> Vec<Arc<str>> {
        self.shapes.containing(lat, lon)
    }

    /// City of the first shape in index order containing the coordinate.
    #[must_use]
    pub fn first_containing(&self, lat: f64, lon: f64) -> Option<Arc<str>> {
        self.shapes.first_containing(lat, lon)
    }

    /// The nearest point document or shape anchor.
    #[must_use]
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<NearestPoint<Arc<str>>> {
        self.points.nearest(lat, lon)
    }

    #[must_use]
    pub const fn counts(&self) -> SnapshotCounts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use tantivy::{Index, IndexReader};

    use super::*;
    use crate::schema::build_schema;
    use crate::test_support::{bavaria, scratch_dir};

    #[test]
    fn cities_are_held_in_memory() {
        let dir = scratch_dir("snapshot_cities");
        bavaria().build(&dir).unwrap();

        let index = Index::open_in_dir(&dir).unwrap();
        let fields = IndexFields::from_schema(&build_schema()).unwrap();
        let reader: IndexReader = index.reader().unwrap();
        let snapshot = IndexSnapshot::load(&reader.searcher(), &fields).unwrap();
        drop(reader);
        drop(index);

        assert_eq!(snapshot.first_containing(48.1374, 11.5755).as_deref(), Some("München"));
        assert_eq!(snapshot.containing(48.28, 11.57), [Arc::<str>::from("Unterschleißheim")]);
        let nearest = snapshot.nearest(48.11, 11.43).unwrap();
        assert_eq!(&*nearest.payload, "Planegg");
        assert!(nearest.distance_km < 2.0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
