#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial structures for reverse geocoding.
//!
//! [`ShapeTree`] answers inclusive point-in-polygon lookups over boundary
//! rings and [`PointTree`] answers nearest-point lookups by great-circle
//! distance. Both are bulk-loaded once and are read-only afterwards, so
//! they can be shared freely between threads.
//!
//! Every entry carries an ordinal (its position in the index). Lookups
//! that can produce several equally good answers resolve them to the
//! lowest ordinal, which keeps results deterministic.
//!
//! All public functions take coordinates as `(lat, lon)`.

pub mod boundary;

pub use boundary::{Boundary, GeometryError};

use geo::{BoundingRect, Intersects, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};

/// Mean earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A boundary ring stored in the R-tree with its payload.
struct ShapeEntry<T> {
    payload: T,
    ordinal: u64,
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl<T> RTreeObject for ShapeEntry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree of boundary rings for containment lookups.
pub struct ShapeTree<T> {
    tree: RTree<ShapeEntry<T>>,
}

impl<T: Clone> ShapeTree<T> {
    /// Bulk-loads `(payload, ordinal, ring)` triples.
    #[must_use]
    pub fn bulk_load(shapes: impl IntoIterator<Item = (T, u64, Polygon<f64>)>) -> Self {
        let entries: Vec<_> = shapes
            .into_iter()
            .map(|(payload, ordinal, polygon)| ShapeEntry {
                payload,
                ordinal,
                envelope: compute_envelope(&polygon),
                polygon,
            })
            .collect();

        log::debug!("Loaded {} shapes into R-tree", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the payloads of every shape containing the point, ordered
    /// by ordinal. Points on an edge are contained. A non-finite
    /// coordinate is contained by nothing.
    #[must_use]
    pub fn containing(&self, lat: f64, lon: f64) -> Vec<T> {
        if !is_finite(lat, lon) {
            return Vec::new();
        }
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut hits: Vec<&ShapeEntry<T>> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .collect();
        hits.sort_by_key(|entry| entry.ordinal);

        hits.into_iter().map(|entry| entry.payload.clone()).collect()
    }

    /// Returns the first shape (by ordinal) containing the point.
    #[must_use]
    pub fn first_containing(&self, lat: f64, lon: f64) -> Option<T> {
        if !is_finite(lat, lon) {
            return None;
        }
        let point = geo::Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.intersects(&point))
            .min_by_key(|entry| entry.ordinal)
            .map(|entry| entry.payload.clone())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }
}

/// Result of a nearest-point lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint<T> {
    /// Payload of the nearest point.
    pub payload: T,
    /// Great-circle distance to the query in kilometers.
    pub distance_km: f64,
}

/// R-tree of points for nearest-point lookups.
///
/// Points are stored as unit vectors on the sphere. Euclidean (chord)
/// distance between unit vectors grows monotonically with great-circle
/// distance, so the R-tree's nearest neighbor is also the great-circle
/// nearest neighbor, with no special handling of the antimeridian.
pub struct PointTree<T> {
    tree: RTree<GeomWithData<[f64; 3], (u64, T)>>,
}

impl<T: Clone> PointTree<T> {
    /// Bulk-loads `(payload, ordinal, lat, lon)` tuples.
    #[must_use]
    pub fn bulk_load(points: impl IntoIterator<Item = (T, u64, f64, f64)>) -> Self {
        let entries: Vec<_> = points
            .into_iter()
            .map(|(payload, ordinal, lat, lon)| {
                GeomWithData::new(unit_vector(lat, lon), (ordinal, payload))
            })
            .collect();

        log::debug!("Loaded {} points into R-tree", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Returns the point nearest to `(lat, lon)`, or `None` if the tree
    /// is empty or the coordinate is not finite. Points at exactly the
    /// same distance resolve to the lowest ordinal.
    #[must_use]
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<NearestPoint<T>> {
        if !is_finite(lat, lon) {
            return None;
        }
        let query = unit_vector(lat, lon);
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);

        let (mut best, best_distance_2) = candidates.next()?;
        for (candidate, distance_2) in candidates {
            if distance_2 > best_distance_2 {
                break;
            }
            if candidate.data.0 < best.data.0 {
                best = candidate;
            }
        }

        Some(NearestPoint {
            payload: best.data.1.clone(),
            distance_km: chord_to_km(best_distance_2.sqrt()),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }
}

/// Great-circle distance between two coordinates in kilometers.
#[must_use]
pub fn great_circle_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let [ax, ay, az] = unit_vector(a.0, a.1);
    let [bx, by, bz] = unit_vector(b.0, b.1);
    let chord = (bx - ax).mul_add(bx - ax, (by - ay).mul_add(by - ay, (bz - az).powi(2)));
    chord_to_km(chord.sqrt())
}

const fn is_finite(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite()
}

fn unit_vector(lat: f64, lon: f64) -> [f64; 3] {
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

fn chord_to_km(chord: f64) -> f64 {
    2.0 * EARTH_RADIUS_KM * (chord / 2.0).min(1.0).asin()
}

/// Compute the bounding box envelope for a [`Polygon`].
fn compute_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
