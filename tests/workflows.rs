use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;

use syncup_core::error::SyncupError;
use syncup_core::event::EventBus;
use syncup_core::state::State;
use syncup_core::traits::LlmClient;
use syncup_core::types::{GraphEvent, RunStatus};
use syncup_graph::{GraphExecutor, RunConfig, RunOutcome};
use syncup_test_utils::{fixture_lookup, FailingLlm, ScriptedLlm};
use syncup_workflows::career::{LearningPath, MentorMatch, PortfolioProject, SkillProfile};
use syncup_workflows::hackathon::{Assignment, StackItem};
use syncup_workflows::{Collaborators, WorkflowKind};

fn collaborators(llm: impl LlmClient) -> Collaborators {
    Collaborators::new(Arc::new(llm), Arc::new(fixture_lookup()))
}

async fn run(kind: WorkflowKind, llm: impl LlmClient, seed: State, config: &RunConfig) -> RunOutcome {
    let graph = kind.build(&collaborators(llm)).expect("workflow graph builds");
    GraphExecutor::new(Arc::new(graph)).execute(seed, config).await
}

fn hackathon_seed() -> State {
    WorkflowKind::Hackathon
        .seed(json!({
            "goal": "healthcare access",
            "duration": 3,
            "user_skills": ["Python"],
            "required_skills": ["Python", "FastAPI", "React", "PyTorch"]
        }))
        .unwrap()
}

fn scripted_planner() -> ScriptedLlm {
    ScriptedLlm::new()
        .on("suggest 3 unique", "1. Remote triage assistant\n2. Clinic queue app\n3. Pill reminder")
        .on("refine project ideas", "Remote triage assistant with offline symptom checker")
        .on("project manager", "- Day 1: research\n- Day 2: build MVP\n- Day 3: demo")
        .on(
            "managing a hackathon project",
            r#"[{"member": "Aarav", "tasks": ["Backend"]}, {"member": "Isha", "tasks": ["UI"]}]"#,
        )
        .on("advising a hackathon team", "Rust - fast and safe\nSQLite - zero setup")
}

#[tokio::test]
async fn test_hackathon_refines_then_plans() {
    let llm = scripted_planner()
        .then(r#"{"decision": "not approved", "reason": "Too broad"}"#)
        .then(r#"{"decision": "approved", "reason": "Focused and feasible"}"#);
    let outcome = run(
        WorkflowKind::Hackathon,
        llm,
        hackathon_seed(),
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.visited,
        vec![
            "matchmake",
            "ideas",
            "evaluate",
            "optimize",
            "evaluate",
            "strategy_plan",
            "team_dynamics",
            "tech_stack"
        ]
    );

    let state = &outcome.state;
    assert_eq!(state.get_i64("iteration_count"), Some(2));
    assert_eq!(state.get_str("verdict"), Some("approved"));
    assert_eq!(state.get_str("reason"), Some("Focused and feasible"));
    assert_eq!(
        state.get_str("candidate"),
        Some("Remote triage assistant with offline symptom checker")
    );

    let team: Vec<serde_json::Value> = state.require("team_members").unwrap();
    let names: Vec<&str> = team.iter().filter_map(|m| m["name"].as_str()).collect();
    assert_eq!(names, vec!["Aarav", "Isha", "Kabir"]);

    let dynamics: Vec<Assignment> = state.require("team_dynamics").unwrap();
    assert_eq!(dynamics[1].tasks, vec!["UI"]);
    let stack: Vec<StackItem> = state.require("tech_stack").unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].tool, "Rust");
}

#[tokio::test]
async fn test_hackathon_fanout_writes_disjoint_fields() {
    let llm = scripted_planner().then(r#"{"decision": "approved", "reason": "Solid"}"#);
    let graph = WorkflowKind::Hackathon
        .build(&collaborators(llm))
        .expect("workflow graph builds");
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let outcome = GraphExecutor::new(Arc::new(graph))
        .with_events(bus.clone())
        .execute(hackathon_seed(), &RunConfig::default())
        .await;
    assert_eq!(outcome.status, RunStatus::Completed);

    let mut written: HashMap<String, HashSet<String>> = HashMap::new();
    let mut order = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let GraphEvent::NodeCompleted { node, fields, .. } = event {
            order.push(node.clone());
            written.entry(node).or_default().extend(fields);
        }
    }
    assert_eq!(
        order,
        vec!["matchmake", "ideas", "evaluate", "strategy_plan", "team_dynamics", "tech_stack"]
    );

    let team = &written["team_dynamics"];
    let stack = &written["tech_stack"];
    assert!(team.is_disjoint(stack), "{:?} overlaps {:?}", team, stack);

    // Everything the branches wrote is new relative to the state they forked from.
    let mut before: HashSet<String> = hackathon_seed()
        .field_names()
        .into_iter()
        .map(String::from)
        .collect();
    for node in ["matchmake", "ideas", "evaluate", "strategy_plan"] {
        before.extend(written[node].iter().cloned());
    }
    let after: HashSet<String> = outcome
        .state
        .field_names()
        .into_iter()
        .map(String::from)
        .filter(|f| !before.contains(f))
        .collect();
    let branches: HashSet<String> = team.union(stack).cloned().collect();
    assert_eq!(branches, after);
    assert_eq!(
        after,
        HashSet::from(["team_dynamics".to_string(), "tech_stack".to_string()])
    );
}

#[tokio::test]
async fn test_hackathon_stops_at_ceiling() {
    let llm = scripted_planner().on(
        "hackathon evaluator",
        r#"{"decision": "not approved", "reason": "Needs work"}"#,
    );
    let config = RunConfig::default().with_ceiling(3);
    let outcome = run(WorkflowKind::Hackathon, llm, hackathon_seed(), &config).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let state = &outcome.state;
    assert_eq!(state.get_i64("iteration_count"), Some(3));
    assert_eq!(state.get_str("verdict"), Some("max-reached"));
    assert_eq!(
        state.get_str("reason"),
        Some("Iteration limit reached before approval.")
    );
    assert_eq!(outcome.visited.iter().filter(|n| *n == "evaluate").count(), 3);
    assert!(!state.contains("strategy_plan"));
    assert!(!state.contains("tech_stack"));
}

#[tokio::test]
async fn test_hackathon_fallbacks_without_llm() {
    let outcome = run(
        WorkflowKind::Hackathon,
        FailingLlm::default(),
        hackathon_seed(),
        &RunConfig::default(),
    )
    .await;

    // The fallback idea mentions healthcare, which the fallback rule approves.
    assert_eq!(outcome.status, RunStatus::Completed);
    let state = &outcome.state;
    assert_eq!(
        state.get_str("candidate"),
        Some("AI-driven platform for healthcare access")
    );
    assert_eq!(state.get_str("verdict"), Some("approved"));
    assert_eq!(
        state.get_str("strategy_plan"),
        Some("Error generating strategy plan.")
    );
    let dynamics: Vec<Assignment> = state.require("team_dynamics").unwrap();
    assert_eq!(dynamics.len(), 1);
    assert_eq!(dynamics[0].member, "Aarav");
    let stack: Vec<StackItem> = state.require("tech_stack").unwrap();
    assert_eq!(stack.len(), 5);
    assert!(state.trace().iter().any(|t| t.contains("fallback")));
}

#[tokio::test]
async fn test_hackathon_runs_are_repeatable() {
    let first = run(
        WorkflowKind::Hackathon,
        FailingLlm::default(),
        hackathon_seed(),
        &RunConfig::default(),
    )
    .await;
    let second = run(
        WorkflowKind::Hackathon,
        FailingLlm::default(),
        hackathon_seed(),
        &RunConfig::default(),
    )
    .await;
    assert_eq!(first.state, second.state);
}

fn career_seed(input_type: &str, input_data: &str) -> State {
    WorkflowKind::Career
        .seed(json!({
            "user_id": "u-42",
            "input_type": input_type,
            "input_data": input_data,
            "target_role": "ML Engineer"
        }))
        .unwrap()
}

#[tokio::test]
async fn test_career_from_skill_list() {
    let outcome = run(
        WorkflowKind::Career,
        FailingLlm::default(),
        career_seed("skills", "Python, SQL"),
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let state = &outcome.state;
    assert_eq!(state.trace().len(), 5);

    let profile: SkillProfile = state.require("skill_profile").unwrap();
    assert_eq!(profile.user_id, "u-42");
    assert_eq!(profile.skill_names(), vec!["Python", "SQL"]);

    let path: LearningPath = state.require("learning_path").unwrap();
    assert_eq!(path.skill_gaps, vec!["Machine Learning", "Docker"]);
    assert_eq!(path.timeline_weeks, 8);

    let projects: Vec<PortfolioProject> = state.require("portfolio_projects").unwrap();
    assert_eq!(projects.len(), 2);

    let mentors: Vec<MentorMatch> = state.require("mentor_matches").unwrap();
    let names: Vec<&str> = mentors.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Dr. Rao", "Vikram", "Sana"]);
}

#[tokio::test]
async fn test_career_from_resume() {
    let reply = r#"Here is the parsed resume:
{"name": "Asha", "skills": {"languages": ["JavaScript"], "frameworks": ["React"]},
 "experience": [{"role": "Intern", "organization": "Acme", "skills_used": ["React"]}]}"#;
    let llm = ScriptedLlm::new().on("parse this resume", reply);
    let mut seed = career_seed("resume", "Asha - frontend intern at Acme");
    seed = seed.with("target_role", "Frontend Developer");
    let outcome = run(WorkflowKind::Career, llm, seed, &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let state = &outcome.state;
    assert_eq!(state.get("resume_data").unwrap()["name"], "Asha");
    let profile: SkillProfile = state.require("skill_profile").unwrap();
    assert_eq!(profile.total_experience_years, 1.5);
    let path: LearningPath = state.require("learning_path").unwrap();
    assert_eq!(path.skill_gaps, vec!["CSS"]);
    let projects: Vec<PortfolioProject> = state.require("portfolio_projects").unwrap();
    assert_eq!(projects[0].title, "Real-time Collaboration Platform");
}

#[tokio::test]
async fn test_career_stops_on_missing_prerequisite() {
    let seed = WorkflowKind::Career
        .seed(json!({"input_type": "skills", "input_data": "Go"}))
        .unwrap();
    let outcome = run(
        WorkflowKind::Career,
        FailingLlm::default(),
        seed,
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "learning_path");
    assert!(failure.message.contains("target_role"));
    assert_eq!(outcome.state.trace().len(), 2);
    assert!(!outcome.state.contains("portfolio_projects"));
}

#[tokio::test]
async fn test_career_resume_needs_llm() {
    let outcome = run(
        WorkflowKind::Career,
        FailingLlm::new("quota exceeded"),
        career_seed("resume", "some resume text"),
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    let failure = outcome.state.error().unwrap();
    assert_eq!(failure.node, "input_processor");
    assert!(failure.message.contains("quota exceeded"));
    assert!(outcome.state.trace().is_empty());
}

fn assistant_seed(input: serde_json::Value) -> State {
    WorkflowKind::Assistant.seed(input).unwrap()
}

#[tokio::test]
async fn test_assistant_routes_to_matchmake() {
    let seed = assistant_seed(json!({
        "user_input": "Find me a teammate for the hackathon",
        "context": {"skills": ["Python"], "desired": ["React", "PyTorch"]}
    }));
    let outcome = run(
        WorkflowKind::Assistant,
        FailingLlm::default(),
        seed,
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.visited, vec!["router", "matchmake"]);
    let output = outcome.state.get("output").unwrap();
    assert_eq!(output["type"], "matchmake");
    assert_eq!(output["query"]["desired"], json!(["react", "pytorch"]));
    let names: Vec<&str> = output["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    // Aarav adds no desired skill but still earns the interest bonus.
    assert_eq!(names, vec!["Isha", "Kabir", "Aarav"]);
}

#[tokio::test]
async fn test_assistant_routes_to_mentor() {
    let seed = assistant_seed(json!({
        "user_input": "I need a mentor for healthcare machine learning"
    }));
    let outcome = run(
        WorkflowKind::Assistant,
        FailingLlm::default(),
        seed,
        &RunConfig::default(),
    )
    .await;

    assert_eq!(outcome.status, RunStatus::Completed);
    let output = outcome.state.get("output").unwrap();
    assert_eq!(output["type"], "mentor");
    assert_eq!(output["mentors"][0]["name"], "Dr. Rao");
    assert_eq!(output["mentors"][0]["score"], 2.0);
    assert_eq!(output["mentors"][1]["why"], "General guidance");
}

#[tokio::test]
async fn test_assistant_chat() {
    let llm = ScriptedLlm::new().with_default("Rust is a systems language.");
    let seed = assistant_seed(json!({"user_input": "What is Rust?"}));
    let outcome = run(WorkflowKind::Assistant, llm, seed, &RunConfig::default()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.state.trace()[0], "Router -> chat");
    let output = outcome.state.get("output").unwrap();
    assert_eq!(output["reply"], "Rust is a systems language.");
}

#[tokio::test]
async fn test_assistant_chat_failure_is_contained() {
    let seed = assistant_seed(json!({"user_input": "hello"}));
    let outcome = run(
        WorkflowKind::Assistant,
        FailingLlm::default(),
        seed,
        &RunConfig::default(),
    )
    .await;
    assert_eq!(outcome.status, RunStatus::CompletedWithError);
    assert_eq!(outcome.state.error().unwrap().node, "chat");
}

#[test]
fn test_graph_outlines() {
    let collab = collaborators(FailingLlm::default());
    let outline = WorkflowKind::Hackathon.build(&collab).unwrap().describe();
    assert!(outline.starts_with("graph hackathon (entry: matchmake)"));
    assert!(outline.contains("evaluate -[max-reached]-> END"));
    assert!(outline.contains("strategy_plan => team_dynamics, tech_stack"));

    for kind in WorkflowKind::ALL {
        assert!(kind.build(&collab).is_ok(), "{} builds", kind);
    }
}

#[test]
fn test_seed_rejects_missing_fields() {
    let err = WorkflowKind::Assistant.seed(json!({})).unwrap_err();
    assert!(matches!(err, SyncupError::Config(_)));
}
