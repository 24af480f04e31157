//! Tantivy index schema for the reverse geocoder.
//!
//! Every document is either a shape (a boundary ring with an optional
//! anchor point) or a supplemental point. Documents are never searched by
//! term; the stored fields are loaded into R-trees when an index is
//! opened, and `ordinal` records the order documents were added in.

use revgeo_spatial::Boundary;
use tantivy::TantivyDocument;
use tantivy::schema::{Field, NumericOptions, STORED, STRING, Schema, Value};

use crate::IndexError;

/// Names of all fields in the reverse geocoder schema.
pub struct FieldNames;

impl FieldNames {
    /// City name (e.g. "München").
    pub const CITY: &'static str = "city";
    /// Document kind, see [`DocumentKind`].
    pub const KIND: &'static str = "kind";
    /// Boundary ring as a `GeoJSON` polygon. Shapes only.
    pub const BOUNDARY: &'static str = "boundary";
    /// Latitude of the point, or of the shape's anchor.
    pub const LAT: &'static str = "lat";
    /// Longitude of the point, or of the shape's anchor.
    pub const LON: &'static str = "lon";
    /// Insertion order.
    pub const ORDINAL: &'static str = "ordinal";
}

/// All resolved field handles for efficient document construction.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub city: Field,
    pub kind: Field,
    pub boundary: Field,
    pub lat: Field,
    pub lon: Field,
    pub ordinal: Field,
}

impl IndexFields {
    /// Resolves field handles from a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema was not built by [`build_schema`].
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            city: schema.get_field(FieldNames::CITY)?,
            kind: schema.get_field(FieldNames::KIND)?,
            boundary: schema.get_field(FieldNames::BOUNDARY)?,
            lat: schema.get_field(FieldNames::LAT)?,
            lon: schema.get_field(FieldNames::LON)?,
            ordinal: schema.get_field(FieldNames::ORDINAL)?,
        })
    }
}

/// Builds the Tantivy schema for the reverse geocoder index.
///
/// Fields:
/// - `city`: STRING (exact + stored)
/// - `kind`: STRING (exact + stored), `shape` or `point`
/// - `boundary`: stored `GeoJSON` polygon
/// - `lat`, `lon`: f64 (stored + fast)
/// - `ordinal`: u64 (indexed + stored + fast)
#[must_use]
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(FieldNames::CITY, STRING | STORED);
    builder.add_text_field(FieldNames::KIND, STRING | STORED);
    builder.add_text_field(FieldNames::BOUNDARY, STORED);

    let f64_options = NumericOptions::default().set_stored().set_fast();
    builder.add_f64_field(FieldNames::LAT, f64_options.clone());
    builder.add_f64_field(FieldNames::LON, f64_options);

    builder.add_u64_field(
        FieldNames::ORDINAL,
        NumericOptions::default()
            .set_indexed()
            .set_stored()
            .set_fast(),
    );

    builder.build()
}

/// Kind tag stored with every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Shape,
    Point,
}

impl DocumentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::Point => "point",
        }
    }

    #[must_use]
    pub fn from_str_tag(tag: &str) -> Option<Self> {
        match tag {
            "shape" => Some(Self::Shape),
            "point" => Some(Self::Point),
            _ => None,
        }
    }
}

/// A document as written to (and read back from) the index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexedDocument {
    /// A city boundary.
    Shape { city: String, boundary: Boundary },
    /// A supplemental point not covered by any shape.
    Point { city: String, lat: f64, lon: f64 },
}

impl IndexedDocument {
    #[must_use]
    pub fn city(&self) -> &str {
        match self {
            Self::Shape { city, .. } | Self::Point { city, .. } => city,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> DocumentKind {
        match self {
            Self::Shape { .. } => DocumentKind::Shape,
            Self::Point { .. } => DocumentKind::Point,
        }
    }

    /// Position used for nearest-point lookups: the point itself, or the
    /// shape's anchor if it has one.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            Self::Shape { boundary, .. } => boundary.anchor(),
            Self::Point { lat, lon, .. } => Some((*lat, *lon)),
        }
    }

    /// Converts to a Tantivy document at position `ordinal`.
    #[must_use]
    pub fn to_document(&self, fields: &IndexFields, ordinal: u64) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(fields.city, self.city());
        doc.add_text(fields.kind, self.kind().as_str());
        doc.add_u64(fields.ordinal, ordinal);

        if let Self::Shape { boundary, .. } = self {
            doc.add_text(fields.boundary, boundary.to_geojson());
        }
        if let Some((lat, lon)) = self.position() {
            doc.add_f64(fields.lat, lat);
            doc.add_f64(fields.lon, lon);
        }

        doc
    }

    /// Reads a stored document back, returning it with its ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::CorruptDocument`] if a required field is
    /// missing or the stored boundary no longer parses.
    pub fn from_document(
        doc: &TantivyDocument,
        fields: &IndexFields,
    ) -> Result<(u64, Self), IndexError> {
        let ordinal = doc
            .get_first(fields.ordinal)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IndexError::CorruptDocument("missing ordinal".to_string()))?;
        let city = doc
            .get_first(fields.city)
            .and_then(|v| v.as_str())
            .ok_or_else(|| IndexError::CorruptDocument(format!("document {ordinal} has no city")))?
            .to_string();
        let kind = doc
            .get_first(fields.kind)
            .and_then(|v| v.as_str())
            .and_then(DocumentKind::from_str_tag)
            .ok_or_else(|| IndexError::CorruptDocument(format!("document {ordinal} has no kind")))?;
        let lat = doc.get_first(fields.lat).and_then(|v| v.as_f64());
        let lon = doc.get_first(fields.lon).and_then(|v| v.as_f64());

        let document = match kind {
            DocumentKind::Shape => {
                let geojson = doc
                    .get_first(fields.boundary)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        IndexError::CorruptDocument(format!("shape {city} has no boundary"))
                    })?;
                let parsed = revgeo_spatial::boundary::parse(geojson).map_err(|e| {
                    IndexError::CorruptDocument(format!("shape {city}: {e}"))
                })?;
                // The stored anchor is authoritative.
                let boundary = Boundary {
                    polygon: parsed.polygon,
                    representative_point: lat
                        .zip(lon)
                        .map(|(lat, lon)| geo::Point::new(lon, lat)),
                };
                Self::Shape { city, boundary }
            }
            DocumentKind::Point => {
                let (Some(lat), Some(lon)) = (lat, lon) else {
                    return Err(IndexError::CorruptDocument(format!(
                        "point {city} has no coordinates"
                    )));
                };
                Self::Point { city, lat, lon }
            }
        };

        Ok((ordinal, document))
    }
}
