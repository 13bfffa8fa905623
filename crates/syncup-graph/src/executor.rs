use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use syncup_core::config::ExecutorConfig;
use syncup_core::error::{Result, SyncupError};
use syncup_core::event::EventBus;
use syncup_core::state::{State, StateUpdate};
use syncup_core::traits::CheckpointStore;
use syncup_core::types::{Checkpoint, GraphEvent, NodeFailure, RunId, RunStatus};

use super::edge::END;
use super::graph::Graph;
use super::node::{Node, NodeContext};

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Correlates checkpoints and log files.
    pub run_id: RunId,
    /// Ceiling for refine/evaluate cycles, visible to nodes.
    pub iteration_ceiling: u32,
    /// Timeout for a single node invocation.
    pub node_timeout: Option<Duration>,
    /// Multiplier for the derived invocation cap.
    pub invocation_cap_factor: usize,
    /// Explicit invocation cap. Overrides the derived one.
    pub max_invocations: Option<usize>,
    /// Checked before each node invocation.
    pub cancel: CancellationToken,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl RunConfig {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            run_id: RunId::new(),
            iteration_ceiling: config.iteration_ceiling.max(1),
            node_timeout: config.node_timeout(),
            invocation_cap_factor: config.invocation_cap_factor,
            max_invocations: config.max_invocations,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Ceilings below 1 are raised to 1.
    pub fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.iteration_ceiling = ceiling.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_max_invocations(mut self, cap: usize) -> Self {
        self.max_invocations = Some(cap);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Total node invocations allowed for a graph of `node_count` nodes.
    pub fn invocation_cap(&self, node_count: usize) -> usize {
        self.max_invocations.unwrap_or(
            self.invocation_cap_factor * self.iteration_ceiling as usize + node_count,
        )
    }
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Final state. On failure, the state as of the last successful merge
    /// plus the recorded error.
    pub state: State,
    pub status: RunStatus,
    /// Number of node invocations, including a failed one.
    pub invocations: usize,
    /// Node names in invocation order.
    pub visited: Vec<String>,
    pub elapsed_ms: u64,
    /// Why the run was aborted, if it was.
    pub abort_reason: Option<String>,
}

/// Drives a [`Graph`] from its entry node to the terminal marker.
///
/// A run owns its `State` exclusively. Branches created by fan-out are
/// queued and executed one after another, FIFO, so trace entries are totally
/// ordered. No node failure escapes [`execute`](Self::execute): it is
/// recorded in the state and reflected in the returned status.
pub struct GraphExecutor {
    graph: Arc<Graph>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    events: Option<Arc<EventBus>>,
}

struct Progress {
    state: State,
    queue: VecDeque<String>,
    invocations: usize,
}

impl GraphExecutor {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            checkpoints: None,
            events: None,
        }
    }

    /// Save a checkpoint after every merge.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Publish run events on the bus.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Run the graph from its entry node.
    pub async fn execute(&self, initial_state: State, config: &RunConfig) -> RunOutcome {
        info!(
            graph = %self.graph.name(),
            run_id = %config.run_id,
            "Starting graph run"
        );
        let progress = Progress {
            state: initial_state,
            queue: VecDeque::from([self.graph.entry().to_string()]),
            invocations: 0,
        };
        self.drive(progress, config).await
    }

    /// Continue a run from its last checkpoint.
    ///
    /// The pending branches stored in the checkpoint are executed in order.
    /// Invocations already consumed count toward the cap, and the ceiling
    /// the run started with replaces the one in `config`.
    pub async fn resume(&self, run_id: &RunId, config: &RunConfig) -> Result<RunOutcome> {
        let store = self
            .checkpoints
            .as_ref()
            .ok_or_else(|| SyncupError::Checkpoint("no checkpoint store configured".into()))?;
        let checkpoint = store
            .load(run_id)
            .await?
            .ok_or_else(|| SyncupError::Checkpoint(format!("no checkpoint for run {}", run_id)))?;
        if checkpoint.graph != self.graph.name() {
            return Err(SyncupError::Checkpoint(format!(
                "run {} belongs to graph '{}', not '{}'",
                run_id,
                checkpoint.graph,
                self.graph.name()
            )));
        }
        if let Some(unknown) = checkpoint
            .pending
            .iter()
            .find(|n| !self.graph.contains(n))
        {
            return Err(SyncupError::Checkpoint(format!(
                "pending node '{}' is not part of graph '{}'",
                unknown,
                self.graph.name()
            )));
        }

        info!(
            graph = %self.graph.name(),
            run_id = %run_id,
            pending = checkpoint.pending.len(),
            invocations = checkpoint.invocations,
            "Resuming graph run"
        );

        if checkpoint.iteration_ceiling != config.iteration_ceiling {
            debug!(
                run_id = %run_id,
                stored = checkpoint.iteration_ceiling,
                requested = config.iteration_ceiling,
                "Keeping the run's original iteration ceiling"
            );
        }
        let config = config
            .clone()
            .with_run_id(run_id.clone())
            .with_ceiling(checkpoint.iteration_ceiling);
        let progress = Progress {
            state: checkpoint.state,
            queue: checkpoint.pending.into(),
            invocations: checkpoint.invocations,
        };
        Ok(self.drive(progress, &config).await)
    }

    async fn drive(&self, progress: Progress, config: &RunConfig) -> RunOutcome {
        let start = Instant::now();
        let run_id = config.run_id.clone();
        let cap = config.invocation_cap(self.graph.node_count());
        let Progress {
            mut state,
            mut queue,
            mut invocations,
        } = progress;
        let mut visited = Vec::new();
        let mut abort_reason = None;

        self.publish(GraphEvent::RunStarted {
            run_id: run_id.clone(),
            graph: self.graph.name().to_string(),
        });

        let status = loop {
            let Some(name) = queue.pop_front() else {
                break RunStatus::Completed;
            };

            if config.cancel.is_cancelled() {
                info!(run_id = %run_id, node = %name, "Run cancelled before node");
                break RunStatus::Cancelled;
            }

            if invocations >= cap {
                let err = SyncupError::RunAborted { invocations, cap };
                error!(run_id = %run_id, node = %name, error = %err, "Invocation cap exceeded");
                abort_reason = Some(err.to_string());
                break RunStatus::Aborted;
            }

            let Some(node) = self.graph.node(&name) else {
                // Only reachable through a stale checkpoint.
                let reason = format!("node '{}' is not registered", name);
                error!(run_id = %run_id, "{}", reason);
                abort_reason = Some(reason);
                break RunStatus::Aborted;
            };

            invocations += 1;
            visited.push(name.clone());
            let ctx = NodeContext {
                run_id: run_id.clone(),
                node: name.clone(),
                iteration_ceiling: config.iteration_ceiling,
                invocation: invocations,
            };

            info!(run_id = %run_id, node = %name, invocation = invocations, "Executing node");
            self.publish(GraphEvent::NodeStarted {
                run_id: run_id.clone(),
                node: name.clone(),
                invocation: invocations,
            });

            let node_start = Instant::now();
            let update = match invoke(node, &state, &ctx, config.node_timeout).await {
                Ok(update) => update,
                Err(e) => {
                    let message = failure_message(e);
                    error!(run_id = %run_id, node = %name, error = %message, "Node failed");
                    self.publish(GraphEvent::NodeFailed {
                        run_id: run_id.clone(),
                        node: name.clone(),
                        error: message.clone(),
                    });
                    state.record_failure(NodeFailure {
                        node: name,
                        message,
                    });
                    break RunStatus::CompletedWithError;
                }
            };

            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            let fields = update.field_names();
            state.merge(update);
            debug!(run_id = %run_id, node = %name, elapsed_ms, ?fields, "Node merged");
            self.publish(GraphEvent::NodeCompleted {
                run_id: run_id.clone(),
                node: name.clone(),
                elapsed_ms,
                fields,
            });

            let Some(route) = self.graph.route(&name) else {
                let reason = format!("node '{}' has no route", name);
                error!(run_id = %run_id, "{}", reason);
                abort_reason = Some(reason);
                break RunStatus::Aborted;
            };
            let step = match route.resolve(&state) {
                Ok(step) => step,
                Err(reason) => {
                    let err = SyncupError::Config(reason);
                    error!(run_id = %run_id, node = %name, error = %err, "Routing failed");
                    state.record_failure(NodeFailure {
                        node: name,
                        message: err.to_string(),
                    });
                    abort_reason = Some(err.to_string());
                    break RunStatus::Aborted;
                }
            };

            debug!(
                run_id = %run_id,
                from = %name,
                label = step.label.unwrap_or("-"),
                to = ?step.next,
                "Routed"
            );
            self.publish(GraphEvent::Routed {
                run_id: run_id.clone(),
                from: name.clone(),
                label: step.label.map(str::to_string),
                to: step.next.clone(),
            });

            queue.extend(step.next.into_iter().filter(|n| n != END));
            self.save_checkpoint(config, &state, &queue, invocations).await;
        };

        if status == RunStatus::Completed {
            self.clear_checkpoint(&run_id).await;
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            status = %status,
            invocations,
            elapsed_ms,
            "Graph run finished"
        );
        self.publish(GraphEvent::RunFinished {
            run_id: run_id.clone(),
            status,
            invocations,
        });

        RunOutcome {
            run_id,
            state,
            status,
            invocations,
            visited,
            elapsed_ms,
            abort_reason,
        }
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }

    async fn save_checkpoint(
        &self,
        config: &RunConfig,
        state: &State,
        queue: &VecDeque<String>,
        invocations: usize,
    ) {
        let Some(ref store) = self.checkpoints else {
            return;
        };
        let run_id = &config.run_id;
        let checkpoint = Checkpoint {
            run_id: run_id.clone(),
            graph: self.graph.name().to_string(),
            state: state.clone(),
            pending: queue.iter().cloned().collect(),
            invocations,
            iteration_ceiling: config.iteration_ceiling,
            timestamp: Utc::now(),
        };
        if let Err(e) = store.save(&checkpoint).await {
            warn!(run_id = %run_id, error = %e, "Failed to save checkpoint");
        }
    }

    async fn clear_checkpoint(&self, run_id: &RunId) {
        if let Some(ref store) = self.checkpoints {
            match store.delete(run_id).await {
                Ok(n) => debug!(run_id = %run_id, deleted = n, "Cleared checkpoint"),
                Err(e) => warn!(run_id = %run_id, error = %e, "Failed to clear checkpoint"),
            }
        }
    }
}

/// Run one node, converting panics and timeouts into errors.
async fn invoke(
    node: &Arc<dyn Node>,
    state: &State,
    ctx: &NodeContext,
    timeout: Option<Duration>,
) -> Result<StateUpdate> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| node.run(state, ctx))) {
        Ok(fut) => AssertUnwindSafe(fut).catch_unwind(),
        Err(payload) => return Err(SyncupError::node(&ctx.node, panic_message(&*payload))),
    };

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(SyncupError::NodeTimeout {
                    node: ctx.node.clone(),
                    timeout_secs: limit.as_secs(),
                })
            }
        },
        None => fut.await,
    };

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(SyncupError::node(&ctx.node, panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("panicked: {}", detail)
}

/// The node name is recorded separately, so strip it from the message.
fn failure_message(err: SyncupError) -> String {
    match err {
        SyncupError::NodeExecution { message, .. } => message,
        other => other.to_string(),
    }
}
