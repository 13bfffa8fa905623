use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// LLM client: prompt text in, opaque text out.
///
/// Implementations handle their own timeouts and retries. Failures are
/// reported as `SyncupError::Provider`.
pub trait LlmClient: Send + Sync + 'static {
    fn call<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Search over a named record collection.
pub trait LookupStore: Send + Sync + 'static {
    /// Return matching records. No matches is an empty list, not an error.
    fn search<'a>(
        &'a self,
        criteria: &'a SearchCriteria,
    ) -> BoxFuture<'a, Result<Vec<serde_json::Value>>>;
}

/// Optional persistence hook for run snapshots.
pub trait CheckpointStore: Send + Sync + 'static {
    /// Persist the latest snapshot for a run, replacing older ones.
    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>>;

    /// Load the latest snapshot for a run.
    fn load<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<Checkpoint>>>;

    /// Drop all snapshots for a run. Returns how many were removed.
    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<usize>>;
}
