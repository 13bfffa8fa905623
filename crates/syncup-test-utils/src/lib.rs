//! Test doubles and fixtures shared by the SyncUp crates.

pub mod checkpoint;
pub mod fixtures;
pub mod llm;
pub mod lookup;

pub use checkpoint::MemoryCheckpointStore;
pub use fixtures::{fixture_lookup, mentors, roles, users};
pub use llm::{FailingLlm, ScriptedLlm, SlowLlm};
pub use lookup::MemoryLookup;

/// Fresh temporary directory, removed on drop.
pub fn temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("syncup_test_")
        .tempdir()
        .expect("create temp dir")
}
