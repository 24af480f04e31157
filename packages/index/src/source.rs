//! Where boundary documents come from.
//!
//! Fetching the documents (e.g. downloading them from the URLs in the
//! shape catalog) happens before a build; the builder only reads them
//! through [`GeometrySource`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use revgeo_index_models::ShapeDefinition;

use crate::IndexError;

/// Supplies the boundary document for a shape.
pub trait GeometrySource {
    /// Returns the raw boundary document for `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::GeometryFileMissing`] if there is no document
    /// for the shape, or another error if it cannot be read.
    fn read_boundary(&self, shape: &ShapeDefinition) -> Result<String, IndexError>;
}

/// Reads boundary documents from `<dir>/<shape.filename>`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the boundary document for `shape`.
    #[must_use]
    pub fn path_for(&self, shape: &ShapeDefinition) -> PathBuf {
        self.dir.join(&shape.filename)
    }
}

impl GeometrySource for DirectorySource {
    fn read_boundary(&self, shape: &ShapeDefinition) -> Result<String, IndexError> {
        let path = self.path_for(shape);
        std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                IndexError::GeometryFileMissing {
                    shape: shape.id.clone(),
                    path: path.display().to_string(),
                }
            } else {
                IndexError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scratch_dir, shape};

    #[test]
    fn reads_file_named_after_shape() {
        let dir = scratch_dir("source_reads");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("köln.json"), "{}").unwrap();

        let source = DirectorySource::new(&dir);
        assert_eq!(source.read_boundary(&shape("Köln")).unwrap(), "{}");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_names_the_shape() {
        let dir = scratch_dir("source_missing");
        let source = DirectorySource::new(&dir);

        let err = source.read_boundary(&shape("Juist")).unwrap_err();
        assert!(
            matches!(err, IndexError::GeometryFileMissing { ref shape, .. } if shape == "Juist"),
            "{err}"
        );
    }
}
