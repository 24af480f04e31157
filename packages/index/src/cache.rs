//! Registry of open indexes.
//!
//! [`SearcherCache`] hands out at most one [`Searcher`] per index
//! directory for the lifetime of a service. It is an ordinary value: the
//! service owns it and passes it by reference to whatever handles
//! requests.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::IndexError;
use crate::searcher::Searcher;

/// Caches opened indexes keyed by canonical directory path.
#[derive(Default)]
pub struct SearcherCache {
    entries: RwLock<BTreeMap<PathBuf, Arc<Searcher>>>,
}

impl SearcherCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached searcher for `index_dir`, opening it on first
    /// use.
    ///
    /// Opening happens without holding the lock, so two callers may open
    /// the same index concurrently. Only the first to insert is kept; the
    /// other handle is closed and the cached one returned, so every
    /// caller gets the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Unavailable`] if the directory does not exist
    /// or cannot be opened as an index.
    pub fn get_or_open(&self, index_dir: impl AsRef<Path>) -> Result<Arc<Searcher>, IndexError> {
        let index_dir = index_dir.as_ref();
        let key = index_dir
            .canonicalize()
            .map_err(|e| IndexError::Unavailable {
                path: index_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        if let Some(searcher) = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(searcher));
        }

        let opened = Arc::new(Searcher::open(&key)?);
        Ok(self.insert_if_absent(key, opened))
    }

    /// Inserts `searcher` under `key` unless another searcher got there
    /// first, and returns whichever is cached.
    fn insert_if_absent(&self, key: PathBuf, searcher: Arc<Searcher>) -> Arc<Searcher> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match entries.entry(key) {
            Entry::Occupied(entry) => {
                let cached = Arc::clone(entry.get());
                drop(entries);
                log::debug!(
                    "Index at {} was opened concurrently; keeping the cached handle",
                    cached.path().display()
                );
                if let Ok(loser) = Arc::try_unwrap(searcher) {
                    loser.close();
                }
                cached
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(searcher)),
        }
    }

    /// Removes every cached searcher and closes it.
    ///
    /// A searcher still used by in-flight queries stays open until its
    /// last reference is dropped. Returns the number of searchers closed
    /// immediately.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(
            &mut *self
                .entries
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        let mut closed = 0;
        for (path, searcher) in drained {
            match Arc::try_unwrap(searcher) {
                Ok(searcher) => {
                    searcher.close();
                    closed += 1;
                }
                Err(shared) => {
                    log::warn!(
                        "Index at {} is still in use by {} reference(s); it will be released when they finish",
                        path.display(),
                        Arc::strong_count(&shared) - 1
                    );
                }
            }
        }

        log::info!("Closed {closed} cached index(es)");
        closed
    }

    /// Number of cached searchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
