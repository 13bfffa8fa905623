//! Hackathon planner: matchmaking, a bounded idea refine/evaluate loop, and
//! a fan-out into team and tech-stack planning once an idea is approved.
//!
//! ```text
//! matchmake -> ideas -> evaluate
//! evaluate -[approved]-> strategy_plan => team_dynamics, tech_stack
//! evaluate -[not-approved]-> optimize -> evaluate
//! evaluate -[max-reached]-> END
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use syncup_core::error::Result;
use syncup_core::state::{State, StateUpdate};
use syncup_core::traits::{LlmClient, LookupStore};
use syncup_core::types::SearchCriteria;
use syncup_graph::{Graph, GraphBuilder, Node, NodeContext, RouteLabel, END};

use crate::parse::{extract_json, extract_object, split_items};
use crate::scoring::rank_teammates;
use crate::{require_text, Collaborators};

// Seed fields.
pub const GOAL: &str = "goal";
pub const DURATION: &str = "duration";
pub const USER_SKILLS: &str = "user_skills";
pub const REQUIRED_SKILLS: &str = "required_skills";

// Written by `matchmake`.
pub const TEAM_MEMBERS: &str = "team_members";
// Written by `ideas`; `candidate` is rewritten by `optimize`.
pub const IDEAS: &str = "ideas";
pub const CANDIDATE: &str = "candidate";
// Written by `evaluate`.
pub const ITERATION_COUNT: &str = "iteration_count";
pub const VERDICT: &str = "verdict";
pub const REASON: &str = "reason";
// Written once each after approval.
pub const STRATEGY_PLAN: &str = "strategy_plan";
pub const TEAM_DYNAMICS: &str = "team_dynamics";
pub const TECH_STACK: &str = "tech_stack";

const CEILING_REASON: &str = "Iteration limit reached before approval.";
const NO_REASON: &str = "No explanation provided by LLM.";

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
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

impl Verdict {
    /// Read the verdict recorded by `evaluate`. Anything unrecognized
    /// counts as not approved.
    pub fn from_state(state: &State) -> Self {
        match state.get_str(VERDICT) {
            Some("approved") => Verdict::Approved,
            Some("max-reached") => Verdict::MaxReached,
            _ => Verdict::NotApproved,
        }
    }

    /// Interpret an LLM `decision` string.
    fn from_decision(decision: &str) -> Self {
        let d = decision.to_lowercase();
        if d.contains("not") {
            Verdict::NotApproved
        } else if d.contains("approved") {
            Verdict::Approved
        } else {
            Verdict::NotApproved
        }
    }
}

/// A task assignment for one team member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub member: String,
    pub tasks: Vec<String>,
}

/// A recommended tool with a one-line justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackItem {
    pub tool: String,
    pub reason: String,
}

impl StackItem {
    fn new(tool: &str, reason: &str) -> Self {
        Self {
            tool: tool.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn default_stack() -> Vec<StackItem> {
    vec![
        StackItem::new("Python", "Popular for ML/AI and fast development"),
        StackItem::new("FastAPI", "Simple and fast backend for APIs"),
        StackItem::new("React", "Flexible and scalable frontend"),
        StackItem::new("PostgreSQL", "Reliable relational database"),
        StackItem::new("Docker", "Portable containerization"),
    ]
}

fn fallback_ideas(goal: &str) -> Vec<String> {
    vec![
        format!("AI-driven platform for {}", goal),
        format!("Blockchain-based solution for {}", goal),
        format!("Mobile-first global app tackling {}", goal),
    ]
}

/// Build the hackathon graph.
pub fn build(collab: &Collaborators) -> Result<Graph> {
    GraphBuilder::new("hackathon")
        .register_node(
            "matchmake",
            Matchmake {
                lookup: collab.lookup.clone(),
            },
        )
        .register_node("ideas", Ideas::new(collab))
        .register_node("evaluate", Evaluate::new(collab))
        .register_node("optimize", Optimize::new(collab))
        .register_node("strategy_plan", StrategyPlan::new(collab))
        .register_node("team_dynamics", TeamDynamics::new(collab))
        .register_node("tech_stack", TechStack::new(collab))
        .add_unconditional_edge("matchmake", "ideas")
        .add_unconditional_edge("ideas", "evaluate")
        .add_conditional_edges(
            "evaluate",
            Verdict::from_state,
            [
                (Verdict::Approved, "strategy_plan"),
                (Verdict::NotApproved, "optimize"),
                (Verdict::MaxReached, END),
            ],
        )
        .add_unconditional_edge("optimize", "evaluate")
        .add_fanout_edges("strategy_plan", ["team_dynamics", "tech_stack"])
        .add_unconditional_edge("team_dynamics", END)
        .add_unconditional_edge("tech_stack", END)
        .set_entry("matchmake")
        .build()
}

/// Ranks candidate teammates from the `users` collection.
pub struct Matchmake {
    lookup: Arc<dyn LookupStore>,
}

impl Node for Matchmake {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let skills = state.get_strings(USER_SKILLS);
            let desired = state.get_strings(REQUIRED_SKILLS);
            let users = self.lookup.search(&SearchCriteria::collection("users")).await?;
            let team = rank_teammates(&skills, &desired, &users);
            info!(candidates = users.len(), matched = team.len(), "Matchmaking done");
            StateUpdate::new()
                .trace(format!("Matchmake: {} teammate(s) found", team.len()))
                .set_serialized(TEAM_MEMBERS, &team)
        })
    }
}

macro_rules! llm_node {
    ($name:ident) => {
        pub struct $name {
            llm: Arc<dyn LlmClient>,
        }

        impl $name {
            pub fn new(collab: &Collaborators) -> Self {
                Self {
                    llm: collab.llm.clone(),
                }
            }
        }
    };
}

llm_node!(Ideas);
llm_node!(Evaluate);
llm_node!(Optimize);
llm_node!(StrategyPlan);
llm_node!(TeamDynamics);
llm_node!(TechStack);

impl Node for Ideas {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let goal = require_text(state, GOAL)?;
            let prompt = format!(
                "You are participating in a global hackathon.\n\
                 The hackathon goal is: {goal}.\n\n\
                 Suggest 3 unique and innovative project ideas that could be applied worldwide, \
                 across multiple industries or communities.\n\
                 Keep the ideas short (1 sentence each) but clear enough to inspire a project team."
            );
            let mut update = StateUpdate::new();
            let ideas = match self.llm.call(&prompt).await {
                Ok(reply) => split_items(&reply),
                Err(e) => {
                    warn!(error = %e, "Idea generation failed, using fallback ideas");
                    update = update.trace("Ideas: LLM unavailable, using fallback ideas");
                    fallback_ideas(&goal)
                }
            };
            let candidate = match ideas.first() {
                Some(idea) => idea.clone(),
                None => {
                    update = update.trace("Ideas: no ideas in reply, using a generic candidate");
                    format!("Innovative solution for {}", goal)
                }
            };
            Ok(update
                .set(IDEAS, ideas)
                .set(CANDIDATE, candidate.as_str())
                .trace(format!("Ideas: picked \"{}\"", candidate)))
        })
    }
}

/// Read a verdict out of an evaluator reply: a `{decision, reason}` object
/// when present, otherwise keywords in the text.
pub fn parse_evaluation(reply: &str) -> (Verdict, String) {
    if let Some(obj) = extract_object(reply) {
        if let Some(decision) = obj.get("decision").and_then(Value::as_str) {
            let reason = obj
                .get("reason")
                .and_then(Value::as_str)
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(NO_REASON);
            return (Verdict::from_decision(decision), reason.to_string());
        }
    }
    let lower = reply.to_lowercase();
    let verdict = if lower.contains("not approved") {
        Verdict::NotApproved
    } else if lower.contains("approved") {
        Verdict::Approved
    } else {
        Verdict::NotApproved
    };
    (verdict, NO_REASON.to_string())
}

impl Node for Evaluate {
    fn run<'a>(
        &'a self,
        state: &'a State,
        ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let count = state.get_u64(ITERATION_COUNT).unwrap_or(0) + 1;
            let mut update = StateUpdate::new().set(ITERATION_COUNT, count);

            let (verdict, reason) = if count >= u64::from(ctx.iteration_ceiling) {
                (Verdict::MaxReached, CEILING_REASON.to_string())
            } else {
                let goal = require_text(state, GOAL)?;
                let candidate = require_text(state, CANDIDATE)?;
                let prompt = format!(
                    "You are a professional hackathon evaluator and mentor. \
                     Analyze the project idea for innovation, feasibility, and global applicability. \
                     Return your evaluation in JSON with two fields: \
                     {{\"decision\": \"approved\" or \"not approved\", \"reason\": \"<short explanation>\"}}.\n\n\
                     Hackathon Goal: {goal}\n\
                     Project Idea: {candidate}"
                );
                match self.llm.call(&prompt).await {
                    Ok(reply) => parse_evaluation(&reply),
                    Err(e) => {
                        warn!(error = %e, "Evaluation failed, applying fallback rule");
                        update = update.trace("Evaluate: LLM unavailable, applying fallback rule");
                        if candidate.to_lowercase().contains("health") {
                            (
                                Verdict::Approved,
                                "Fallback rule: health-related projects are prioritized.".into(),
                            )
                        } else {
                            (
                                Verdict::NotApproved,
                                "Fallback rule: idea not in priority domain.".into(),
                            )
                        }
                    }
                }
            };

            info!(iteration = count, verdict = verdict.as_label(), "Idea evaluated");
            Ok(update
                .set(VERDICT, verdict.as_label())
                .set(REASON, reason.as_str())
                .trace(format!("Evaluate #{}: {} ({})", count, verdict.as_label(), reason)))
        })
    }
}

impl Node for Optimize {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let goal = require_text(state, GOAL)?;
            let candidate = require_text(state, CANDIDATE)?;
            let feedback = state.get_str(REASON).unwrap_or(NO_REASON);
            let prompt = format!(
                "You are a professional hackathon mentor. \
                 Refine project ideas so they are more innovative, globally impactful, \
                 and technically feasible. Output only the improved project idea as plain text.\n\n\
                 Hackathon Goal: {goal}\n\
                 Current Project Idea: {candidate}\n\
                 Evaluator feedback: {feedback}"
            );
            let (refined, note) = match self.llm.call(&prompt).await {
                Ok(reply) if !reply.trim().is_empty() => (reply.trim().to_string(), "refined"),
                Ok(_) => (format!("{} (optimized)", candidate), "empty reply, marked optimized"),
                Err(e) => {
                    warn!(error = %e, "Optimization failed, keeping idea");
                    (
                        format!("{} (optimized - fallback)", candidate),
                        "LLM unavailable, marked optimized",
                    )
                }
            };
            Ok(StateUpdate::new()
                .set(CANDIDATE, refined)
                .trace(format!("Optimize: {}", note)))
        })
    }
}

impl Node for StrategyPlan {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let goal = require_text(state, GOAL)?;
            let duration = require_text(state, DURATION)?;
            let candidate = require_text(state, CANDIDATE)?;
            let prompt = format!(
                "You are an expert hackathon project manager. \
                 Create a clear, step-by-step workflow strategy for building the given project idea \
                 within the hackathon duration. Focus on realistic milestones, task breakdown, and teamwork.\n\n\
                 Hackathon Duration: {duration} days\n\
                 Hackathon Goal: {goal}\n\
                 Approved Project Idea: {candidate}\n\n\
                 Answer with one step per line, for example:\n\
                 - Day 1: Research & brainstorming\n\
                 - Day 2: Build MVP backend & frontend\n\
                 Ensure the plan fits within {duration} days."
            );
            let (plan, fallback) = match self.llm.call(&prompt).await {
                Ok(reply) if !reply.trim().is_empty() => (reply.trim().to_string(), None),
                Ok(_) => (
                    "Strategy plan could not be generated.".to_string(),
                    Some("empty reply, placeholder plan"),
                ),
                Err(e) => {
                    warn!(error = %e, "Strategy planning failed");
                    (
                        "Error generating strategy plan.".to_string(),
                        Some("LLM unavailable, placeholder plan"),
                    )
                }
            };
            let mut update = StateUpdate::new().set(STRATEGY_PLAN, plan);
            if let Some(note) = fallback {
                update = update.trace(format!("Strategy plan: {}", note));
            }
            Ok(update.trace(format!("Strategy plan for {} day(s) ready", duration)))
        })
    }
}

/// Deal plan steps out to members in turn, keeping first-appearance order.
pub fn round_robin(plan: &str, members: &[String]) -> Vec<Assignment> {
    if members.is_empty() {
        return Vec::new();
    }
    let mut out: Vec<Assignment> = Vec::new();
    for (i, task) in split_items(plan).into_iter().enumerate() {
        let member = &members[i % members.len()];
        match out.iter_mut().find(|a| &a.member == member) {
            Some(a) => a.tasks.push(task),
            None => out.push(Assignment {
                member: member.clone(),
                tasks: vec![task],
            }),
        }
    }
    out
}

fn parse_assignments(reply: &str) -> Option<Vec<Assignment>> {
    match extract_json(reply)? {
        v @ Value::Array(_) => serde_json::from_value(v).ok(),
        _ => None,
    }
}

impl Node for TeamDynamics {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let plan = state.get_str(STRATEGY_PLAN).unwrap_or_default();
            let members: Vec<String> = state
                .get(TEAM_MEMBERS)
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|m| m.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            if plan.is_empty() || members.is_empty() {
                return StateUpdate::new()
                    .trace("Team dynamics: no plan or no teammates, nothing to assign")
                    .set_serialized(TEAM_DYNAMICS, &Vec::<Assignment>::new());
            }

            let prompt = format!(
                "You are managing a hackathon project.\n\n\
                 Strategy plan:\n{plan}\n\n\
                 Team members:\n{}\n\n\
                 Assign tasks concisely and fairly. Return a JSON list with each member and short task summaries, e.g.:\n\
                 {}",
                members.join(", "),
                json!([{"member": "Aarav", "tasks": ["Backend setup", "API integration"]}])
            );
            let (assignments, note) = match self.llm.call(&prompt).await {
                Ok(reply) => match parse_assignments(&reply) {
                    Some(a) => (a, "assigned by LLM"),
                    None => (round_robin(plan, &members), "unparseable reply, assigned round-robin"),
                },
                Err(e) => {
                    warn!(error = %e, "Task assignment failed, using round-robin");
                    (round_robin(plan, &members), "LLM unavailable, assigned round-robin")
                }
            };
            StateUpdate::new()
                .trace(format!("Team dynamics: {}", note))
                .set_serialized(TEAM_DYNAMICS, &assignments)
        })
    }
}

/// Parse a stack recommendation: a JSON list of `{tool, reason}` objects,
/// or `tool - reason` lines.
pub fn parse_stack(reply: &str) -> Vec<StackItem> {
    if let Some(v @ Value::Array(_)) = extract_json(reply) {
        if let Ok(items) = serde_json::from_value::<Vec<StackItem>>(v) {
            return items;
        }
    }
    split_items(reply)
        .iter()
        .filter_map(|line| {
            let (tool, reason) = line.split_once(" - ")?;
            let tool = tool.trim();
            (!tool.is_empty()).then(|| StackItem::new(tool, reason.trim()))
        })
        .collect()
}

impl Node for TechStack {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let candidate = require_text(state, CANDIDATE)?;
            let prompt = format!(
                "You are advising a hackathon team.\n\
                 Project idea: {candidate}\n\n\
                 Suggest a concise recommended tech stack (5 to 7 items). \
                 For each tool, include a very short reason why it is suitable.\n\
                 Return a valid JSON list of objects, e.g.:\n{}",
                json!([{"tool": "Python", "reason": "Great for AI/ML and rapid prototyping"}])
            );
            let (stack, note) = match self.llm.call(&prompt).await {
                Ok(reply) => {
                    let parsed = parse_stack(&reply);
                    if parsed.is_empty() {
                        (default_stack(), "unparseable reply, using default stack")
                    } else {
                        (parsed, "recommended by LLM")
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Tech stack recommendation failed, using default stack");
                    (default_stack(), "LLM unavailable, using default stack")
                }
            };
            StateUpdate::new()
                .trace(format!("Tech stack: {} ({} tools)", note, stack.len()))
                .set_serialized(TECH_STACK, &stack)
        })
    }
}
