use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::State;

/// Unique run identifier, used to correlate checkpoints and logs.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every branch reached the terminal marker.
    Completed,
    /// A node failed; the failure is recorded in the state's `error` field.
    CompletedWithError,
    /// The caller cancelled the run between two nodes.
    Cancelled,
    /// The invocation cap was exceeded or a routing invariant was violated.
    Aborted,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithError => write!(f, "completed_with_error"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// A node failure captured into the state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// Name of the node that failed.
    pub node: String,
    /// Human-readable failure description.
    pub message: String,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.node, self.message)
    }
}

/// Criteria passed to the lookup collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Collection to search (e.g. `users`, `mentors`, `roles`).
    pub collection: String,
    /// Case-insensitive keywords; a record matches if any keyword occurs
    /// in one of its string fields. Empty means "all records".
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Maximum number of records to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            ..Default::default()
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record matches the keywords. Strings nested in arrays and
    /// objects are searched too.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let keywords: Vec<String> = self.keywords.iter().map(|k| k.to_lowercase()).collect();
        contains_any(record, &keywords)
    }

    /// Filter records by keyword and apply the limit, keeping input order.
    pub fn apply(
        &self,
        records: impl IntoIterator<Item = serde_json::Value>,
    ) -> Vec<serde_json::Value> {
        let matched = records.into_iter().filter(|r| self.matches(r));
        match self.limit {
            Some(n) => matched.take(n).collect(),
            None => matched.collect(),
        }
    }
}

fn contains_any(value: &serde_json::Value, keywords: &[String]) -> bool {
    match value {
        serde_json::Value::String(s) => {
            let s = s.to_lowercase();
            keywords.iter().any(|k| s.contains(k.as_str()))
        }
        serde_json::Value::Array(items) => items.iter().any(|v| contains_any(v, keywords)),
        serde_json::Value::Object(map) => map.values().any(|v| contains_any(v, keywords)),
        _ => false,
    }
}

/// Snapshot written after every node merge when checkpointing is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    /// Name of the graph the run belongs to.
    pub graph: String,
    /// State after the last merged node.
    pub state: State,
    /// Branches still waiting to execute, in queue order.
    pub pending: Vec<String>,
    /// Node invocations consumed so far.
    pub invocations: usize,
    /// Ceiling the run was started with. A resumed run keeps it.
    pub iteration_ceiling: u32,
    pub timestamp: DateTime<Utc>,
}

/// Events emitted by the executor during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    RunStarted {
        run_id: RunId,
        graph: String,
    },
    NodeStarted {
        run_id: RunId,
        node: String,
        invocation: usize,
    },
    NodeCompleted {
        run_id: RunId,
        node: String,
        elapsed_ms: u64,
        fields: Vec<String>,
    },
    NodeFailed {
        run_id: RunId,
        node: String,
        error: String,
    },
    Routed {
        run_id: RunId,
        from: String,
        label: Option<String>,
        to: Vec<String>,
    },
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        invocations: usize,
    },
}

impl GraphEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            GraphEvent::RunStarted { run_id, .. }
            | GraphEvent::NodeStarted { run_id, .. }
            | GraphEvent::NodeCompleted { run_id, .. }
            | GraphEvent::NodeFailed { run_id, .. }
            | GraphEvent::Routed { run_id, .. }
            | GraphEvent::RunFinished { run_id, .. } => run_id,
        }
    }
}
