use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};

use syncup_core::error::{Result, SyncupError};
use syncup_core::state::State;
use syncup_core::traits::CheckpointStore;
use syncup_core::types::{Checkpoint, RunId};

/// Persistent checkpoint store backed by SQLite.
///
/// Keeps only the latest snapshot per run.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncupError::Checkpoint(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to open checkpoint store: {}", e)))?;
        Self::init(conn)
    }

    /// In-memory database, gone when the store is dropped.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to open checkpoint store: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS graph_checkpoints (
                 run_id TEXT PRIMARY KEY,
                 graph TEXT NOT NULL,
                 state_json TEXT NOT NULL,
                 pending_json TEXT NOT NULL,
                 invocations INTEGER NOT NULL DEFAULT 0,
                 iteration_ceiling INTEGER NOT NULL DEFAULT 1,
                 timestamp TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_gcp_graph
                 ON graph_checkpoints(graph, timestamp DESC);",
        )
        .map_err(|e| {
            SyncupError::Checkpoint(format!("Failed to initialize checkpoint schema: {}", e))
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Save a checkpoint, replacing any older one for the same run.
    pub fn save_sync(&self, cp: &Checkpoint) -> Result<()> {
        let state_json = serde_json::to_string(&cp.state)?;
        let pending_json = serde_json::to_string(&cp.pending)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO graph_checkpoints
                 (run_id, graph, state_json, pending_json, invocations, iteration_ceiling, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cp.run_id.as_str(),
                cp.graph,
                state_json,
                pending_json,
                cp.invocations as i64,
                cp.iteration_ceiling as i64,
                cp.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| SyncupError::Checkpoint(format!("Failed to save checkpoint: {}", e)))?;
        Ok(())
    }

    /// Load the latest checkpoint for a run.
    pub fn load_sync(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT graph, state_json, pending_json, invocations, iteration_ceiling, timestamp
                 FROM graph_checkpoints
                 WHERE run_id = ?1",
                params![run_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to load checkpoint: {}", e)))?;

        let Some((graph, state_json, pending_json, invocations, ceiling, ts_str)) = row else {
            return Ok(None);
        };
        let state: State = serde_json::from_str(&state_json)?;
        let pending: Vec<String> = serde_json::from_str(&pending_json)?;
        Ok(Some(Checkpoint {
            run_id: run_id.clone(),
            graph,
            state,
            pending,
            invocations: invocations as usize,
            iteration_ceiling: u32::try_from(ceiling).unwrap_or(u32::MAX).max(1),
            timestamp: DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /// Delete the checkpoint for a run.
    pub fn delete_sync(&self, run_id: &RunId) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM graph_checkpoints WHERE run_id = ?1",
            params![run_id.as_str()],
        )
        .map_err(|e| SyncupError::Checkpoint(format!("Failed to delete checkpoint: {}", e)))
    }

    /// Runs with a stored checkpoint, newest first.
    pub fn list_runs(&self) -> Result<Vec<(RunId, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT run_id, graph FROM graph_checkpoints ORDER BY timestamp DESC")
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((RunId(row.get::<_, String>(0)?), row.get::<_, String>(1)?))
            })
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to list checkpoints: {}", e)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyncupError::Checkpoint(format!("Failed to read checkpoint row: {}", e)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SyncupError::Checkpoint(e.to_string()))
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save<'a>(&'a self, checkpoint: &'a Checkpoint) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.save_sync(checkpoint) })
    }

    fn load<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<Checkpoint>>> {
        Box::pin(async move { self.load_sync(run_id) })
    }

    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move { self.delete_sync(run_id) })
    }
}
