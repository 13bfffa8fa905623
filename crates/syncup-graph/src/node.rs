use futures::future::BoxFuture;

use syncup_core::error::Result;
use syncup_core::state::{State, StateUpdate};
use syncup_core::types::RunId;

/// Read-only run information handed to every node invocation.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Run this invocation belongs to.
    pub run_id: RunId,
    /// Name the node was registered under.
    pub node: String,
    /// Ceiling for refine/evaluate cycles.
    pub iteration_ceiling: u32,
    /// 1-based index of this invocation within the run.
    pub invocation: usize,
}

/// A step in a workflow graph.
///
/// A node reads the current state and returns a partial update. It keeps no
/// memory of its own between invocations, so the executor may call it any
/// number of times within one run. Errors, panics, and timeouts are caught
/// by the executor and recorded against the node's name.
pub trait Node: Send + Sync + 'static {
    fn run<'a>(&'a self, state: &'a State, ctx: &'a NodeContext)
        -> BoxFuture<'a, Result<StateUpdate>>;
}

/// Adapts a synchronous closure into a [`Node`].
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&State, &NodeContext) -> Result<StateUpdate> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Node for FnNode<F>
where
    F: Fn(&State, &NodeContext) -> Result<StateUpdate> + Send + Sync + 'static,
{
    fn run<'a>(
        &'a self,
        state: &'a State,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        // Evaluated inside the future so a panic surfaces on poll.
        Box::pin(async move { (self.f)(state, ctx) })
    }
}
