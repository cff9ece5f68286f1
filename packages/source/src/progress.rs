//! Progress reporting for table builds.
//!
//! A build walks one [`IdRange`] and settles every id exactly once, either
//! as a row or as a skipped failure. [`ProgressCallback`] receives those
//! events; rendering lives in whichever crate picks a backend.

use std::sync::Arc;

use poke_etl_source_models::IdRange;

/// How one id settled during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOutcome {
    /// The record was appended to the table.
    Row,
    /// The fetch failed and the id was left out.
    Skipped,
}

/// Receives per-id events while an entity table is built.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// across buffered fetch futures via `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first fetch.
    fn begin(&self, entity: &str, range: IdRange);

    /// Called after each id settles, in ascending id order.
    fn settled(&self, id: u32, outcome: IdOutcome);

    /// Called when the build stops. `failed_at` is the id that aborted it.
    fn finish(&self, failed_at: Option<u32>);
}

/// Discards every event.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn begin(&self, _entity: &str, _range: IdRange) {}
    fn settled(&self, _id: u32, _outcome: IdOutcome) {}
    fn finish(&self, _failed_at: Option<u32>) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
