//! Build progress reporting.
//!
//! [`crate::build_index`] reports one unit of work per shape and per
//! supplemental point, plus a message for each phase. The CLI renders
//! this with `indicatif`; library callers and tests pass
//! [`null_progress`].

use std::sync::Arc;

/// Receives progress from an index build.
pub trait ProgressCallback: Send + Sync {
    /// Number of shapes and points the build will process.
    fn set_total(&self, total: u64);

    /// `delta` more shapes or points were processed.
    fn inc(&self, delta: u64);

    /// Name of the phase now running.
    fn set_message(&self, msg: String);

    /// The build finished with a summary.
    fn finish(&self, msg: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
