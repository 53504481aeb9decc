//! Progress reporting for harvest stages.
//!
//! The pipeline reports through [`ProgressCallback`] so it stays unaware of
//! how (or whether) progress is rendered. Terminal progress bars live in
//! `catalog_harvest_cli_utils`.

use std::sync::Arc;

/// Receives progress updates from one stage.
///
/// Implementations must be `Send + Sync`; updates arrive from whichever
/// future finishes a unit of work.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total units of work, once known.
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the stage as complete.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// One progress reporter per pipeline stage.
#[derive(Clone)]
pub struct HarvestProgress {
    /// Advanced once per query term searched.
    pub discovery: Arc<dyn ProgressCallback>,
    /// Advanced once per detail request settled.
    pub fetch: Arc<dyn ProgressCallback>,
    /// Advanced once per record enriched or skipped.
    pub enrich: Arc<dyn ProgressCallback>,
}

impl HarvestProgress {
    /// Reporters that discard every update.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            discovery: null_progress(),
            fetch: null_progress(),
            enrich: null_progress(),
        }
    }
}

impl Default for HarvestProgress {
    fn default() -> Self {
        Self::silent()
    }
}
