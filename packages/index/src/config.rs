//! TOML build configuration.
//!
//! ```toml
//! shapes_csv = "data/shapes.csv"
//! points_file = "data/DE.tab"
//! geometry_dir = "data/downloads"
//! index_dir = "data/indices"
//!
//! [point_format]
//! delimiter = ","
//! has_header = true
//! ```
//!
//! Omitted keys keep their defaults.

use std::path::Path;

use revgeo_index_models::IndexerConfig;

use crate::IndexError;

/// Loads an [`IndexerConfig`] from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid
/// configuration.
pub fn load(path: &Path) -> Result<IndexerConfig, IndexError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse(&text)
        .map_err(|e| IndexError::Config(format!("{}: {e}", path.display())))?;
    log::debug!("Loaded config from {}: {config:?}", path.display());
    Ok(config)
}

/// Parses an [`IndexerConfig`] from TOML text.
///
/// # Errors
///
/// Returns an error if the text is not a valid configuration.
pub fn parse(text: &str) -> Result<IndexerConfig, IndexError> {
    toml::from_str(text).map_err(|e: toml::de::Error| IndexError::Config(e.message().to_string()))
}
