//! Shape and point catalog loading.
//!
//! The shape catalog is a CSV file with the positional columns
//! `id, filename, url, points`. Lines starting with `#` are comments and
//! the first row is a header. `points` holds optional known-inside
//! coordinates as `lat|lon` pairs joined by `_`.
//!
//! The point catalog is a delimited file described by a
//! [`PointCatalogFormat`]; by default the OpenGeoDB `DE.tab` export.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use revgeo_index_models::{GeoPoint, LatLon, PointCatalogFormat, ShapeDefinition};

/// Errors from catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be opened.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid delimited text.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// An explicit shape point is not a `lat|lon` pair.
    #[error("invalid point '{value}' for shape {id}")]
    InvalidPoint {
        /// Shape the point belongs to.
        id: String,
        /// The offending value.
        value: String,
    },

    /// A point row has a latitude or longitude that is not a coordinate.
    #[error("invalid coordinate '{value}' on line {line}")]
    InvalidCoordinate {
        /// Line number in the point file.
        line: u64,
        /// The offending value.
        value: String,
    },

    /// The configured delimiter is not a single-byte character.
    #[error("unsupported delimiter {0:?}")]
    InvalidDelimiter(char),

    /// The shape catalog repeats an id, filename or url.
    #[error(transparent)]
    Duplicates(#[from] DuplicateDefinitionError),
}

/// Duplicate keys found in a shape catalog. Each list is sorted and holds
/// every value that occurs more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("duplicate content in shape catalog: {}", summarize(.ids, .filenames, .urls))]
pub struct DuplicateDefinitionError {
    /// Duplicated shape ids.
    pub ids: Vec<String>,
    /// Duplicated file names.
    pub filenames: Vec<String>,
    /// Duplicated urls.
    pub urls: Vec<String>,
}

impl DuplicateDefinitionError {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.filenames.is_empty() && self.urls.is_empty()
    }
}

fn summarize(ids: &[String], filenames: &[String], urls: &[String]) -> String {
    [("ids", ids), ("filenames", filenames), ("urls", urls)]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("{label} [{}]", values.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Loads and validates the shape catalog at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, a points column
/// is malformed, or any id, filename or url is duplicated.
pub fn load_shapes(path: &Path) -> Result<Vec<ShapeDefinition>, CatalogError> {
    let file = File::open(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let shapes = read_shapes(file)?;
    log::info!("Loaded {} shape definitions from {}", shapes.len(), path.display());
    Ok(shapes)
}

/// Reads and validates a shape catalog from any reader.
///
/// # Errors
///
/// See [`load_shapes`].
pub fn read_shapes(reader: impl Read) -> Result<Vec<ShapeDefinition>, CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut shapes = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let column = |i: usize| record.get(i).unwrap_or("");

        let id = column(0).to_string();
        let filename = match column(1) {
            "" if id.is_empty() => String::new(),
            "" => ShapeDefinition::default_filename(&id),
            name => name.to_string(),
        };
        let explicit_points = parse_explicit_points(&id, column(3))?;

        shapes.push(ShapeDefinition {
            url: column(2).to_string(),
            id,
            filename,
            explicit_points,
        });
    }

    let duplicates = find_duplicates(&shapes);
    if !duplicates.is_empty() {
        log::error!("{duplicates}");
        return Err(duplicates.into());
    }

    Ok(shapes)
}

/// Collects every id, filename and url used by more than one shape.
/// Blank values are not keys and never count as duplicates.
#[must_use]
pub fn find_duplicates(shapes: &[ShapeDefinition]) -> DuplicateDefinitionError {
    DuplicateDefinitionError {
        ids: duplicates(shapes.iter().map(|s| s.id.as_str())),
        filenames: duplicates(shapes.iter().map(|s| s.filename.as_str())),
        urls: duplicates(shapes.iter().map(|s| s.url.as_str())),
    }
}

fn duplicates<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values.filter(|v| !v.is_empty()) {
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(value, _)| value.to_string())
        .collect()
}

fn parse_explicit_points(id: &str, raw: &str) -> Result<Vec<LatLon>, CatalogError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    raw.split('_')
        .map(|pair| {
            pair.split_once('|')
                .and_then(|(lat, lon)| {
                    Some(LatLon::new(
                        lat.trim().parse().ok()?,
                        lon.trim().parse().ok()?,
                    ))
                })
                .ok_or_else(|| CatalogError::InvalidPoint {
                    id: id.to_string(),
                    value: pair.to_string(),
                })
        })
        .collect()
}

/// Loads the point catalog at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a kept row
/// has a latitude/longitude that is not a valid coordinate.
pub fn load_points(
    path: &Path,
    format: &PointCatalogFormat,
) -> Result<Vec<GeoPoint>, CatalogError> {
    let file = File::open(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let points = read_points(file, format)?;
    log::info!("Loaded {} points from {}", points.len(), path.display());
    Ok(points)
}

/// Reads a point catalog from any reader.
///
/// Rows where the name, latitude, longitude or any of the format's
/// required columns are blank (or missing) are discarded.
///
/// # Errors
///
/// See [`load_points`].
pub fn read_points(
    reader: impl Read,
    format: &PointCatalogFormat,
) -> Result<Vec<GeoPoint>, CatalogError> {
    let delimiter = u8::try_from(format.delimiter)
        .map_err(|_| CatalogError::InvalidDelimiter(format.delimiter))?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(format.has_header)
        .comment(Some(b'#'))
        .flexible(true)
        .quoting(delimiter != b'\t')
        .from_reader(reader);

    let mut points = Vec::new();
    let mut discarded = 0u64;

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);
        let column = |i: usize| record.get(i).map_or("", str::trim);

        let name = column(format.name_column);
        let lat = column(format.lat_column);
        let lon = column(format.lon_column);
        let blank = [name, lat, lon].iter().any(|v| v.is_empty())
            || format.required_columns.iter().any(|&i| column(i).is_empty());
        if blank {
            discarded += 1;
            continue;
        }

        points.push(GeoPoint {
            name: name.to_string(),
            lat: parse_coordinate(lat, 90.0, line)?,
            lon: parse_coordinate(lon, 180.0, line)?,
        });
    }

    if discarded > 0 {
        log::debug!("Discarded {discarded} point rows with blank required fields");
    }

    Ok(points)
}

fn parse_coordinate(value: &str, limit: f64, line: u64) -> Result<f64, CatalogError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
        .ok_or_else(|| CatalogError::InvalidCoordinate {
            line,
            value: value.to_string(),
        })
}
