use thiserror::Error;

/// Graph definition problems, detected by `GraphBuilder::build`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph '{0}' has no entry node")]
    MissingEntry(String),

    #[error("entry node '{0}' is not registered")]
    UnknownEntry(String),

    #[error("node '{0}' is registered twice")]
    DuplicateNode(String),

    #[error("node name '{0}' is reserved")]
    ReservedName(String),

    #[error("node '{0}' already has a route")]
    DuplicateRoute(String),

    #[error("edge {from} -> {to} references an unregistered node")]
    UnknownNode { from: String, to: String },

    #[error("router on '{node}' can emit label '{label}' but it has no target")]
    UnmappedLabel { node: String, label: String },

    #[error("label '{label}' is mapped twice on '{node}'")]
    DuplicateLabel { node: String, label: String },

    #[error("fan-out from '{0}' has no targets")]
    EmptyFanOut(String),

    #[error("node '{0}' has no outgoing route")]
    NoRoute(String),

    #[error("node '{0}' cannot reach the terminal marker")]
    TerminalUnreachable(String),
}

#[derive(Debug, Error)]
pub enum SyncupError {
    // Graph construction
    #[error("Graph configuration error: {0}")]
    Graph(#[from] GraphError),

    // Node / provider errors
    #[error("Node '{node}' failed: {message}")]
    NodeExecution { node: String, message: String },

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("LLM response parse error: {0}")]
    ProviderParse(String),

    #[error("Missing state field: {0}")]
    MissingField(String),

    #[error("Node '{node}' timed out after {timeout_secs}s")]
    NodeTimeout { node: String, timeout_secs: u64 },

    // Run errors
    #[error("Run aborted after {invocations} node invocations (cap {cap})")]
    RunAborted { invocations: usize, cap: usize },

    #[error("Run cancelled")]
    Cancelled,

    // Collaborators
    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncupError {
    /// Shorthand for a node-level failure with a free-form message.
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncupError>;
