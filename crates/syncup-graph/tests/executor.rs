use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use syncup_core::error::{Result, SyncupError};
use syncup_core::event::EventBus;
use syncup_core::state::{State, StateUpdate};
use syncup_core::types::{GraphEvent, RunId, RunStatus};
use syncup_graph::{
    FnNode, Graph, GraphBuilder, GraphExecutor, Node, NodeContext, RouteLabel, RunConfig, END,
};
use syncup_test_utils::MemoryCheckpointStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approved,
    NotApproved,
    MaxReached,
}

impl RouteLabel for Verdict {
    const ALL: &'static [Self] = &[Verdict::Approved, Verdict::NotApproved, Verdict::MaxReached];

    fn as_label(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::NotApproved => "not-approved",
            Verdict::MaxReached => "max-reached",
        }
    }
}

fn verdict_of(state: &State) -> Verdict {
    match state.get_str("verdict") {
        Some("approved") => Verdict::Approved,
        Some("max-reached") => Verdict::MaxReached,
        _ => Verdict::NotApproved,
    }
}

fn set_x() -> impl Node {
    FnNode::new(|_: &State, _: &NodeContext| Ok(StateUpdate::new().set("x", 1).trace("A: x=1")))
}

fn set_y() -> impl Node {
    FnNode::new(|state: &State, _: &NodeContext| {
        let x = state.require::<i64>("x")?;
        Ok(StateUpdate::new().set("y", x + 1).trace("B: y=x+1"))
    })
}

fn set_z() -> impl Node {
    FnNode::new(|state: &State, _: &NodeContext| {
        let y = state.require::<i64>("y")?;
        Ok(StateUpdate::new().set("z", y * 2).trace("C: z=y*2"))
    })
}

fn linear_with(b: impl Node) -> Arc<Graph> {
    Arc::new(
        GraphBuilder::new("linear")
            .register_node("a", set_x())
            .register_node("b", b)
            .register_node("c", set_z())
            .add_unconditional_edge("a", "b")
            .add_unconditional_edge("b", "c")
            .add_unconditional_edge("c", END)
            .set_entry("a")
            .build()
            .unwrap(),
    )
}

/// Evaluate increments the counter and approves once `approve_at` is hit.
fn evaluate(approve_at: Option<i64>) -> impl Node {
    FnNode::new(move |state: &State, ctx: &NodeContext| {
        let count = state.get_i64("iteration_count").unwrap_or(0) + 1;
        let verdict = if count >= ctx.iteration_ceiling as i64 {
            "max-reached"
        } else if Some(count) == approve_at {
            "approved"
        } else {
            "not-approved"
        };
        Ok(StateUpdate::new()
            .set("iteration_count", count)
            .set("verdict", verdict)
            .trace(format!("evaluate #{}: {}", count, verdict)))
    })
}

fn refine() -> impl Node {
    FnNode::new(|state: &State, _: &NodeContext| {
        let c = state.get_str("candidate").unwrap_or_default();
        Ok(StateUpdate::new()
            .set("candidate", format!("{}+", c))
            .trace("refine"))
    })
}

fn cyclic(approve_at: Option<i64>) -> Arc<Graph> {
    cyclic_with(approve_at, refine())
}

fn cyclic_with(approve_at: Option<i64>, refine: impl Node) -> Arc<Graph> {
    Arc::new(
        GraphBuilder::new("cyclic")
            .register_node(
                "ideas",
                FnNode::new(|_: &State, _: &NodeContext| {
                    Ok(StateUpdate::new().set("candidate", "v0").trace("ideas"))
                }),
            )
            .register_node("evaluate", evaluate(approve_at))
            .register_node("refine", refine)
            .register_node(
                "finish",
                FnNode::new(|_: &State, _: &NodeContext| {
                    Ok(StateUpdate::new().set("plan", "ship it").trace("finish"))
                }),
            )
            .add_unconditional_edge("ideas", "evaluate")
            .add_conditional_edges(
                "evaluate",
                verdict_of,
                [
                    (Verdict::Approved, "finish"),
                    (Verdict::NotApproved, "refine"),
                    (Verdict::MaxReached, END),
                ],
            )
            .add_unconditional_edge("refine", "evaluate")
            .add_unconditional_edge("finish", END)
            .set_entry("ideas")
            .build()
            .unwrap(),
    )
}

fn seed() -> State {
    State::new().with("goal", "demo")
}

#[tokio::test]
async fn test_linear_scenario() {
    let executor = GraphExecutor::new(linear_with(set_y()));
    let outcome = executor.execute(seed(), &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.invocations, 3);
    assert_eq!(outcome.visited, vec!["a", "b", "c"]);
    assert_eq!(
        serde_json::Value::Object(outcome.state.fields().clone()),
        json!({"goal": "demo", "x": 1, "y": 2, "z": 4})
    );
    assert_eq!(outcome.state.trace().len(), 3);
    assert!(outcome.state.error().is_none());
    assert!(outcome.abort_reason.is_none());
}

#[tokio::test]
async fn test_bounded_cycle_reaches_ceiling() {
    let executor = GraphExecutor::new(cyclic(None));
    let config = RunConfig::default().with_ceiling(3);
    let outcome = executor.execute(seed(), &config).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.state.get_i64("iteration_count"), Some(3));
    assert_eq!(outcome.state.get_str("verdict"), Some("max-reached"));
    let evaluations = outcome.visited.iter().filter(|n| *n == "evaluate").count();
    assert_eq!(evaluations, 3);
    assert!(!outcome.state.contains("plan"));
    assert_eq!(outcome.state.get_str("candidate"), Some("v0++"));
}

#[tokio::test]
async fn test_cycle_exits_on_approval() {
    let executor = GraphExecutor::new(cyclic(Some(2)));
    let config = RunConfig::default().with_ceiling(5);
    let outcome = executor.execute(seed(), &config).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.state.get_i64("iteration_count"), Some(2));
    assert_eq!(outcome.state.get_str("plan"), Some("ship it"));
    assert_eq!(
        outcome.visited,
        vec!["ideas", "evaluate", "refine", "evaluate", "finish"]
    );
}

#[tokio::test]
async fn test_error_is_contained() {
    let failing = FnNode::new(|_: &State, _: &NodeContext| -> Result<StateUpdate> {
        Err(SyncupError::Provider("rate limited".into()))
    });
    let executor = GraphExecutor::new(linear_with(failing));
    let outcome = executor.execute(seed(), &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    assert_eq!(outcome.state.trace(), ["A: x=1"]);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "b");
    assert!(failure.message.contains("rate limited"));
    assert!(!outcome.state.contains("z"));
    assert_eq!(outcome.visited, vec!["a", "b"]);
}

#[tokio::test]
async fn test_missing_field_fails_node() {
    let graph = Arc::new(
        GraphBuilder::new("needs-y")
            .register_node("c", set_z())
            .add_unconditional_edge("c", END)
            .set_entry("c")
            .build()
            .unwrap(),
    );
    let outcome = GraphExecutor::new(graph)
        .execute(seed(), &RunConfig::default())
        .await;
    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    assert!(outcome.state.error().unwrap().message.contains("y"));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let panicking = FnNode::new(|_: &State, _: &NodeContext| -> Result<StateUpdate> {
        panic!("index out of bounds")
    });
    let executor = GraphExecutor::new(linear_with(panicking));
    let outcome = executor.execute(seed(), &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "b");
    assert!(failure.message.contains("index out of bounds"));
    assert_eq!(outcome.state.trace(), ["A: x=1"]);
}

struct Sleepy;

impl Node for Sleepy {
    fn run<'a>(
        &'a self,
        _state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StateUpdate::new().set("y", 0))
        })
    }
}

#[tokio::test]
async fn test_timeout_is_a_node_failure() {
    let executor = GraphExecutor::new(linear_with(Sleepy));
    let config = RunConfig::default().with_timeout(Some(Duration::from_millis(20)));
    let outcome = executor.execute(seed(), &config).await;

    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "b");
    assert!(failure.message.contains("timed out"));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let executor = GraphExecutor::new(linear_with(set_y()));
    let outcome = executor
        .execute(seed(), &RunConfig::default().with_cancel(cancel))
        .await;

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.invocations, 0);
    assert!(outcome.state.trace().is_empty());
}

#[tokio::test]
async fn test_cancel_between_nodes() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let cancelling = FnNode::new(move |state: &State, _: &NodeContext| {
        trigger.cancel();
        let x = state.require::<i64>("x")?;
        Ok(StateUpdate::new().set("y", x + 1).trace("B: y=x+1"))
    });
    let executor = GraphExecutor::new(linear_with(cancelling));
    let outcome = executor
        .execute(seed(), &RunConfig::default().with_cancel(cancel))
        .await;

    // The node that requested cancellation still completes and merges.
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.state.trace(), ["A: x=1", "B: y=x+1"]);
    assert!(!outcome.state.contains("z"));
}

#[tokio::test]
async fn test_invocation_cap_aborts() {
    let executor = GraphExecutor::new(cyclic(None));
    let config = RunConfig::default()
        .with_ceiling(100)
        .with_max_invocations(5);
    let outcome = executor.execute(seed(), &config).await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    assert_eq!(outcome.invocations, 5);
    assert!(outcome.abort_reason.unwrap().contains("cap 5"));
    assert!(outcome.state.error().is_none());
}

#[tokio::test]
async fn test_derived_cap_allows_full_cycle() {
    // factor 4 × ceiling 5 + 4 nodes comfortably covers ideas + 5 evaluations + 4 refines
    let executor = GraphExecutor::new(cyclic(None));
    let outcome = executor
        .execute(seed(), &RunConfig::default().with_ceiling(5))
        .await;
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.invocations, 10);
}


fn fanout_graph() -> Arc<Graph> {
    Arc::new(
        GraphBuilder::new("fanout")
            .register_node(
                "plan",
                FnNode::new(|_: &State, _: &NodeContext| {
                    Ok(StateUpdate::new().set("plan", "day 1: build").trace("plan"))
                }),
            )
            .register_node(
                "team",
                FnNode::new(|state: &State, _: &NodeContext| {
                    let plan = state.require::<String>("plan")?;
                    Ok(StateUpdate::new()
                        .set("team", json!([{"member": "Aarav", "tasks": [plan]}]))
                        .trace("team"))
                }),
            )
            .register_node(
                "stack",
                FnNode::new(|_: &State, _: &NodeContext| {
                    Ok(StateUpdate::new()
                        .set("stack", json!([{"tool": "Rust", "reason": "fast"}]))
                        .trace("stack"))
                }),
            )
            .register_node(
                "stack_review",
                FnNode::new(|_: &State, _: &NodeContext| {
                    Ok(StateUpdate::new().set("reviewed", true).trace("stack_review"))
                }),
            )
            .add_fanout_edges("plan", ["stack", "team"])
            .add_unconditional_edge("stack", "stack_review")
            .add_unconditional_edge("stack_review", END)
            .add_unconditional_edge("team", END)
            .set_entry("plan")
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_fanout_branches_run_in_fifo_order() {
    let outcome = GraphExecutor::new(fanout_graph())
        .execute(seed(), &RunConfig::default())
        .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.visited, vec!["plan", "stack", "team", "stack_review"]);
    assert_eq!(
        outcome.state.trace(),
        ["plan", "stack", "team", "stack_review"]
    );
    assert_eq!(outcome.state.get("team").unwrap()[0]["tasks"][0], "day 1: build");
    assert_eq!(outcome.state.get("stack").unwrap()[0]["tool"], "Rust");
    assert_eq!(outcome.state.get("reviewed"), Some(&json!(true)));
}

#[tokio::test]
async fn test_linear_runs_are_repeatable() {
    let executor = GraphExecutor::new(linear_with(set_y()));
    let first = executor.execute(seed(), &RunConfig::default()).await;
    let second = executor.execute(seed(), &RunConfig::default()).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.state, second.state);
    assert_eq!(first.visited, second.visited);
}

#[tokio::test]
async fn test_shared_graph_concurrent_runs() {
    let executor = Arc::new(GraphExecutor::new(cyclic(Some(2))));
    let a = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .execute(State::new().with("goal", "one"), &RunConfig::default())
                .await
        })
    };
    let b = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .execute(State::new().with("goal", "two"), &RunConfig::default())
                .await
        })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert_eq!(a.state.get_str("goal"), Some("one"));
    assert_eq!(b.state.get_str("goal"), Some("two"));
    assert_eq!(a.state.get_i64("iteration_count"), Some(2));
    assert_eq!(b.state.get_i64("iteration_count"), Some(2));
}

#[derive(Debug, Clone, Copy)]
enum Gate {
    Open,
    Jammed,
}

impl RouteLabel for Gate {
    // `Jammed` is deliberately missing so the builder cannot see it.
    const ALL: &'static [Self] = &[Gate::Open];

    fn as_label(&self) -> &'static str {
        match self {
            Gate::Open => "open",
            Gate::Jammed => "jammed",
        }
    }
}

#[tokio::test]
async fn test_unmapped_label_at_runtime_aborts() {
    let graph = Arc::new(
        GraphBuilder::new("gate")
            .register_node("a", set_x())
            .add_conditional_edges("a", |_: &State| Gate::Jammed, [(Gate::Open, END)])
            .set_entry("a")
            .build()
            .unwrap(),
    );
    let outcome = GraphExecutor::new(graph)
        .execute(seed(), &RunConfig::default())
        .await;

    assert_eq!(outcome.status, RunStatus::Aborted);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "a");
    assert!(failure.message.contains("jammed"));
    // The node's own update was merged before routing.
    assert_eq!(outcome.state.get_i64("x"), Some(1));
}

#[tokio::test]
async fn test_checkpoint_saved_per_node_and_cleared() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let executor = GraphExecutor::new(linear_with(set_y())).with_checkpoints(store.clone());
    let outcome = executor.execute(seed(), &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(store.save_count(), 3);
    assert!(store.get(&outcome.run_id).is_none());
}

#[tokio::test]
async fn test_resume_after_failure() {
    let tripped = Arc::new(AtomicBool::new(false));
    let flaky = {
        let tripped = tripped.clone();
        FnNode::new(move |state: &State, _: &NodeContext| {
            if !tripped.swap(true, Ordering::SeqCst) {
                return Err(SyncupError::Provider("transient".into()));
            }
            let x = state.require::<i64>("x")?;
            Ok(StateUpdate::new().set("y", x + 1).trace("B: y=x+1"))
        })
    };
    let store = Arc::new(MemoryCheckpointStore::new());
    let executor = GraphExecutor::new(linear_with(flaky)).with_checkpoints(store.clone());

    let run_id = RunId::new();
    let config = RunConfig::default().with_run_id(run_id.clone());
    let first = executor.execute(seed(), &config).await;
    assert_eq!(first.status, RunStatus::CompletedWithError);

    let checkpoint = store.get(&run_id).unwrap();
    assert_eq!(checkpoint.pending, vec!["b"]);
    assert_eq!(checkpoint.invocations, 1);
    assert!(checkpoint.state.error().is_none());

    let resumed = executor.resume(&run_id, &RunConfig::default()).await.unwrap();
    assert_eq!(resumed.run_id, run_id);
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.invocations, 3);
    assert_eq!(resumed.visited, vec!["b", "c"]);
    assert_eq!(resumed.state.get_i64("z"), Some(4));
    assert!(store.get(&run_id).is_none());
}

#[tokio::test]
async fn test_resume_keeps_original_ceiling() {
    let tripped = Arc::new(AtomicBool::new(false));
    let flaky_refine = {
        let tripped = tripped.clone();
        FnNode::new(move |state: &State, _: &NodeContext| {
            if !tripped.swap(true, Ordering::SeqCst) {
                return Err(SyncupError::Provider("transient".into()));
            }
            let c = state.get_str("candidate").unwrap_or_default();
            Ok(StateUpdate::new()
                .set("candidate", format!("{}+", c))
                .trace("refine"))
        })
    };
    let store = Arc::new(MemoryCheckpointStore::new());
    let executor =
        GraphExecutor::new(cyclic_with(None, flaky_refine)).with_checkpoints(store.clone());

    let run_id = RunId::new();
    let config = RunConfig::default().with_run_id(run_id.clone()).with_ceiling(3);
    let first = executor.execute(seed(), &config).await;
    assert_eq!(first.status, RunStatus::CompletedWithError);
    assert_eq!(first.state.get_i64("iteration_count"), Some(1));

    let checkpoint = store.get(&run_id).unwrap();
    assert_eq!(checkpoint.pending, vec!["refine"]);
    assert_eq!(checkpoint.iteration_ceiling, 3);

    // The default config carries a ceiling of 5.
    let resumed = executor.resume(&run_id, &RunConfig::default()).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.state.get_i64("iteration_count"), Some(3));
    assert_eq!(resumed.state.get_str("verdict"), Some("max-reached"));
}

#[tokio::test]
async fn test_zero_ceiling_is_raised_to_one() {
    let config = RunConfig::default().with_ceiling(0);
    assert_eq!(config.iteration_ceiling, 1);

    let outcome = GraphExecutor::new(cyclic(None)).execute(seed(), &config).await;
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.state.get_i64("iteration_count"), Some(1));
    assert_eq!(outcome.state.get_str("verdict"), Some("max-reached"));
    assert_eq!(outcome.visited, vec!["ideas", "evaluate"]);
}

#[tokio::test]
async fn test_resume_rejects_foreign_checkpoint() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let run_id = RunId::new();
    store.insert(syncup_core::types::Checkpoint {
        run_id: run_id.clone(),
        graph: "other".into(),
        state: seed(),
        pending: vec!["a".into()],
        invocations: 0,
        iteration_ceiling: 5,
        timestamp: chrono::Utc::now(),
    });
    let executor = GraphExecutor::new(linear_with(set_y())).with_checkpoints(store);

    let err = executor
        .resume(&run_id, &RunConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncupError::Checkpoint(_)));

    let err = executor
        .resume(&RunId::new(), &RunConfig::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no checkpoint"));
}

#[tokio::test]
async fn test_resume_without_store() {
    let executor = GraphExecutor::new(linear_with(set_y()));
    let err = executor
        .resume(&RunId::new(), &RunConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncupError::Checkpoint(_)));
}

#[tokio::test]
async fn test_events_bracket_the_run() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let executor = GraphExecutor::new(linear_with(set_y())).with_events(bus);
    let outcome = executor.execute(seed(), &RunConfig::default()).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.run_id() == &outcome.run_id));
    assert!(matches!(events.first(), Some(GraphEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(GraphEvent::RunFinished {
            status: RunStatus::Completed,
            invocations: 3,
            ..
        })
    ));
    let started = events
        .iter()
        .filter(|e| matches!(e, GraphEvent::NodeStarted { .. }))
        .count();
    let routed = events
        .iter()
        .filter(|e| matches!(e, GraphEvent::Routed { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(routed, 3);
}
