//! `GeoJSON` boundary parsing.
//!
//! A boundary is reduced to a single outer ring: of a `MultiPolygon` only
//! the first polygon is kept, and of a polygon only its exterior ring.
//! Holes and further parts are ignored, so enclaves and islands of an
//! area are not represented.

use std::collections::BTreeSet;

use geo::{Centroid, Coord, InteriorPoint, Intersects, LineString, Point, Polygon};
use geojson::{GeoJson, Geometry, Value};

/// Errors from parsing a boundary document.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// The document is not valid `GeoJSON`.
    #[error("malformed GeoJSON: {0}")]
    Malformed(String),

    /// The document contains no `Polygon` or `MultiPolygon`.
    #[error("document contains no polygon geometry")]
    NoPolygon,

    /// The outer ring has no coordinates.
    #[error("polygon has empty coordinates")]
    EmptyCoordinates,

    /// A position has fewer than two values or a non-finite value.
    #[error("invalid position at index {index}")]
    InvalidPosition {
        /// Zero-based index of the position within the ring.
        index: usize,
    },

    /// The ring has fewer than three distinct vertices.
    #[error("degenerate polygon: {distinct} distinct vertices")]
    Degenerate {
        /// Number of distinct vertices found.
        distinct: usize,
    },
}

/// A parsed shape boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Closed outer ring with `x = lon`, `y = lat`.
    pub polygon: Polygon<f64>,
    /// A point inside the ring, if one could be derived.
    pub representative_point: Option<Point<f64>>,
}

impl Boundary {
    /// Builds a boundary from a ring, deriving its representative point.
    #[must_use]
    pub fn from_polygon(polygon: Polygon<f64>) -> Self {
        let representative_point = representative_point(&polygon);
        Self {
            polygon,
            representative_point,
        }
    }

    /// The representative point as `(lat, lon)`.
    #[must_use]
    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.representative_point.map(|p| (p.y(), p.x()))
    }

    /// Inclusive containment test: points on an edge or vertex count as
    /// inside.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygon.intersects(&Point::new(lon, lat))
    }

    /// Serializes the ring as a `GeoJSON` `Polygon` geometry.
    #[must_use]
    pub fn to_geojson(&self) -> String {
        let ring = self
            .polygon
            .exterior()
            .coords()
            .map(|c| vec![c.x, c.y])
            .collect();
        GeoJson::Geometry(Geometry::new(Value::Polygon(vec![ring]))).to_string()
    }
}

/// Parses a `GeoJSON` document into a [`Boundary`].
///
/// Accepts bare geometries, features, feature collections and geometry
/// collections. The first polygonal geometry in document order is used.
///
/// # Errors
///
/// Returns a [`GeometryError`] if the document is not `GeoJSON`, has no
/// polygon, or its outer ring is empty, invalid or degenerate.
pub fn parse(document: &str) -> Result<Boundary, GeometryError> {
    let geojson: GeoJson = document
        .parse()
        .map_err(|e: geojson::Error| GeometryError::Malformed(e.to_string()))?;

    let positions = first_ring(&geojson).ok_or(GeometryError::NoPolygon)?;
    if positions.is_empty() {
        return Err(GeometryError::EmptyCoordinates);
    }

    let mut coords = Vec::with_capacity(positions.len());
    for (index, position) in positions.iter().enumerate() {
        let (Some(&x), Some(&y)) = (position.first(), position.get(1)) else {
            return Err(GeometryError::InvalidPosition { index });
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(GeometryError::InvalidPosition { index });
        }
        coords.push(Coord { x, y });
    }

    let distinct = coords
        .iter()
        .map(|c| (c.x.to_bits(), c.y.to_bits()))
        .collect::<BTreeSet<_>>()
        .len();
    if distinct < 3 {
        return Err(GeometryError::Degenerate { distinct });
    }

    Ok(Boundary::from_polygon(Polygon::new(
        LineString::from(coords),
        vec![],
    )))
}

/// Finds a point inside `polygon`.
///
/// Uses geo's interior point (which stays inside concave rings, unlike the
/// centroid), then the centroid, keeping whichever first passes the
/// inclusive containment test. Returns `None` for rings with no usable
/// interior, e.g. collinear vertices.
#[must_use]
pub fn representative_point(polygon: &Polygon<f64>) -> Option<Point<f64>> {
    polygon
        .interior_point()
        .filter(|p| polygon.intersects(p))
        .or_else(|| polygon.centroid().filter(|p| polygon.intersects(p)))
}

fn first_ring(geojson: &GeoJson) -> Option<&[Vec<f64>]> {
    match geojson {
        GeoJson::Geometry(geometry) => ring_of(&geometry.value),
        GeoJson::Feature(feature) => feature.geometry.as_ref().and_then(|g| ring_of(&g.value)),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .find_map(|f| f.geometry.as_ref().and_then(|g| ring_of(&g.value))),
    }
}

fn ring_of(value: &Value) -> Option<&[Vec<f64>]> {
    match value {
        Value::Polygon(rings) => Some(rings.first().map_or(&[][..], Vec::as_slice)),
        Value::MultiPolygon(polygons) => Some(
            polygons
                .first()
                .and_then(|rings| rings.first())
                .map_or(&[][..], Vec::as_slice),
        ),
        Value::GeometryCollection(geometries) => {
            geometries.iter().find_map(|g| ring_of(&g.value))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"{
        "type": "Polygon",
        "coordinates": [
            [ [100.0, 0.0], [101.0, 0.0], [101.0, 1.0], [100.0, 1.0], [100.0, 0.0] ]
        ]
    }"#;

    // U-shaped ring whose vertex centroid falls into the notch.
    const CONCAVE: &str = r#"{
        "type": "Polygon",
        "coordinates": [
            [ [0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [2.0, 3.0], [2.0, 1.0],
              [1.0, 1.0], [1.0, 3.0], [0.0, 3.0], [0.0, 0.0] ]
        ]
    }"#;

    #[test]
    fn parses_polygon_with_escaped_properties() {
        let doc = r#"{
            "type": "Polygon",
            "coordinates": [
                [ [100.0, 0.0], [101.0, 0.0], [101.0, 1.0],
                  [100.0, 1.0], [100.0, 0.0] ]
            ],
            "properties": {
                "spam" : [ "foo \"bar\"" ]
            }
        }"#;

        let boundary = parse(doc).unwrap();
        assert_eq!(boundary.polygon.exterior().0.len(), 5);
    }

    #[test]
    fn representative_point_is_inside_convex_ring() {
        let boundary = parse(SQUARE).unwrap();
        let (lat, lon) = boundary.anchor().expect("square has an interior");
        assert!(boundary.contains(lat, lon));
    }

    #[test]
    fn representative_point_is_inside_concave_ring() {
        let boundary = parse(CONCAVE).unwrap();
        let (lat, lon) = boundary.anchor().expect("U shape has an interior");
        assert!(boundary.contains(lat, lon));
        // The notch itself is outside.
        assert!(!boundary.contains(2.0, 1.5));
    }

    #[test]
    fn edges_and_vertices_are_inside() {
        let boundary = parse(SQUARE).unwrap();
        assert!(boundary.contains(0.0, 100.5));
        assert!(boundary.contains(0.5, 101.0));
        assert!(boundary.contains(1.0, 100.0));
        assert!(!boundary.contains(1.000_001, 100.5));
    }

    #[test]
    fn multipolygon_uses_first_outer_ring_only() {
        let doc = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [
                    [ [0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0] ],
                    [ [1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 2.0], [1.0, 1.0] ]
                ],
                [
                    [ [10.0, 10.0], [11.0, 10.0], [11.0, 11.0], [10.0, 11.0], [10.0, 10.0] ]
                ]
            ]
        }"#;

        let boundary = parse(doc).unwrap();
        // hole is not modeled
        assert!(boundary.contains(1.5, 1.5));
        // second polygon is ignored
        assert!(!boundary.contains(10.5, 10.5));
    }

    #[test]
    fn finds_polygon_inside_feature_collection_and_geometry_collection() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": null },
                {
                    "type": "Feature",
                    "properties": { "name": "x" },
                    "geometry": {
                        "type": "GeometryCollection",
                        "geometries": [
                            { "type": "Point", "coordinates": [5.0, 5.0] },
                            { "type": "Polygon", "coordinates": [
                                [ [0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0] ]
                            ] }
                        ]
                    }
                }
            ]
        }"#;

        let boundary = parse(doc).unwrap();
        assert!(boundary.contains(0.1, 0.5));
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(parse("not json"), Err(GeometryError::Malformed(_))));
        assert!(matches!(
            parse(r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#),
            Err(GeometryError::NoPolygon)
        ));
        assert!(matches!(
            parse(r#"{"type": "Polygon", "coordinates": []}"#),
            Err(GeometryError::EmptyCoordinates)
        ));
        assert!(matches!(
            parse(r#"{"type": "Polygon", "coordinates": [[]]}"#),
            Err(GeometryError::EmptyCoordinates)
        ));
        assert!(matches!(
            parse(r#"{"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0], [1.0, 1.0]]]}"#),
            Err(GeometryError::InvalidPosition { index: 1 } | GeometryError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_rings_with_fewer_than_three_distinct_vertices() {
        let doc = r#"{
            "type": "Polygon",
            "coordinates": [ [ [0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 1.0] ] ]
        }"#;
        assert!(matches!(
            parse(doc),
            Err(GeometryError::Degenerate { distinct: 2 })
        ));
    }

    #[test]
    fn geojson_round_trips_through_parser() {
        let boundary = parse(CONCAVE).unwrap();
        let reparsed = parse(&boundary.to_geojson()).unwrap();
        assert_eq!(reparsed.polygon, boundary.polygon);
    }
}
