use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use syncup_core::error::Result;
use syncup_core::traits::CheckpointStore;
use syncup_core::types::{Checkpoint, RunId};

/// In-memory checkpoint store that also counts saves.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    latest: Mutex<HashMap<RunId, Checkpoint>>,
    saves: Mutex<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn get(&self, run_id: &RunId) -> Option<Checkpoint> {
        self.latest.lock().unwrap().get(run_id).cloned()
    }

    /// Store a checkpoint directly, e.g. to simulate a crashed run.
    pub fn insert(&self, checkpoint: Checkpoint) {
        self.latest
            .lock()
            .unwrap()
            .insert(checkpoint.run_id.clone(), checkpoint);
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>> {
        *self.saves.lock().unwrap() += 1;
        self.insert(checkpoint.clone());
        Box::pin(async { Ok(()) })
    }

    fn load<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<Checkpoint>>> {
        let found = self.get(run_id);
        Box::pin(async move { Ok(found) })
    }

    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<usize>> {
        let removed = self.latest.lock().unwrap().remove(run_id).map_or(0, |_| 1);
        Box::pin(async move { Ok(removed) })
    }
}
