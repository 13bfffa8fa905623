//! Graph execution engine for SyncUp workflows.
//!
//! A workflow is a directed graph of named [`Node`]s over one shared
//! [`State`](syncup_core::State). Each node has exactly one [`Route`]:
//! an unconditional successor, a router whose label selects a successor,
//! or a fan-out to several branches. Routing to [`END`] halts a branch.
//!
//! [`GraphBuilder`] validates the definition up front (unknown nodes,
//! unmapped router labels, nodes that can never reach `END`), and
//! [`GraphExecutor`] walks the result with an invocation cap, per-node
//! timeouts, cancellation between nodes, and optional checkpoints.

pub mod builder;
pub mod checkpoint;
pub mod edge;
pub mod executor;
pub mod graph;
pub mod node;
pub mod run_log;

pub use builder::GraphBuilder;
pub use checkpoint::SqliteCheckpointStore;
pub use edge::{Route, RouteLabel, Step, END};
pub use executor::{GraphExecutor, RunConfig, RunOutcome};
pub use graph::Graph;
pub use node::{FnNode, Node, NodeContext};
pub use run_log::RunLogger;
