//! Single-turn assistant: route the request by keywords, then chat,
//! suggest teammates, or recommend mentors.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::info;

use syncup_core::error::Result;
use syncup_core::state::{State, StateUpdate};
use syncup_core::traits::{LlmClient, LookupStore};
use syncup_core::types::SearchCriteria;
use syncup_graph::{FnNode, Graph, GraphBuilder, Node, NodeContext, RouteLabel, END};

use crate::require_text;
use crate::scoring::{rank_mentors, rank_teammates, simple_route, Intent};
use crate::Collaborators;

// Seed fields. `context` may carry `skills`, `desired`, and `goal`.
pub const USER_INPUT: &str = "user_input";
pub const CONTEXT: &str = "context";
// Written by `router`.
pub const INTENT: &str = "intent";
// Written by exactly one of `chat`, `matchmake`, `mentor`.
pub const OUTPUT: &str = "output";

impl RouteLabel for Intent {
    const ALL: &'static [Self] = &[Intent::Chat, Intent::Matchmake, Intent::Mentor];

    fn as_label(&self) -> &'static str {
        match self {
            Intent::Chat => "chat",
            Intent::Matchmake => "matchmake",
            Intent::Mentor => "mentor",
        }
    }
}

impl Intent {
    fn from_state(state: &State) -> Self {
        match state.get_str(INTENT) {
            Some("matchmake") => Intent::Matchmake,
            Some("mentor") => Intent::Mentor,
            _ => Intent::Chat,
        }
    }
}

/// Build the assistant graph.
pub fn build(collab: &Collaborators) -> Result<Graph> {
    GraphBuilder::new("assistant")
        .register_node(
            "router",
            FnNode::new(|state: &State, _: &NodeContext| {
                let input = require_text(state, USER_INPUT)?;
                let intent = simple_route(&input);
                Ok(StateUpdate::new()
                    .set(INTENT, intent.as_label())
                    .trace(format!("Router -> {}", intent.as_label())))
            }),
        )
        .register_node(
            "chat",
            Chat {
                llm: collab.llm.clone(),
            },
        )
        .register_node(
            "matchmake",
            Matchmake {
                lookup: collab.lookup.clone(),
            },
        )
        .register_node(
            "mentor",
            Mentor {
                lookup: collab.lookup.clone(),
            },
        )
        .add_conditional_edges(
            "router",
            Intent::from_state,
            [
                (Intent::Chat, "chat"),
                (Intent::Matchmake, "matchmake"),
                (Intent::Mentor, "mentor"),
            ],
        )
        .add_unconditional_edge("chat", END)
        .add_unconditional_edge("matchmake", END)
        .add_unconditional_edge("mentor", END)
        .set_entry("router")
        .build()
}

fn context_strings(state: &State, key: &str) -> Option<Vec<String>> {
    let items = state.get(CONTEXT)?.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.to_lowercase())
            .collect(),
    )
}

pub struct Chat {
    llm: Arc<dyn LlmClient>,
}

impl Node for Chat {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let input = require_text(state, USER_INPUT)?;
            let prompt = format!(
                "You are SyncUp assistant. Provide descriptive answers based on the question.\n\n\
                 User: {input}"
            );
            let reply = self.llm.call(&prompt).await?;
            Ok(StateUpdate::new()
                .set(OUTPUT, json!({"type": "chat", "reply": reply}))
                .trace("Chat: replied"))
        })
    }
}

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
            let skills = context_strings(state, "skills").unwrap_or_default();
            let desired = context_strings(state, "desired").unwrap_or_else(|| skills.clone());
            let users = self.lookup.search(&SearchCriteria::collection("users")).await?;
            let candidates = rank_teammates(&skills, &desired, &users);
            info!(matched = candidates.len(), "Assistant matchmaking done");
            Ok(StateUpdate::new()
                .set(
                    OUTPUT,
                    json!({
                        "type": "matchmake",
                        "query": {"skills": skills, "desired": desired},
                        "candidates": candidates,
                    }),
                )
                .trace(format!("Matchmake: {} candidate(s)", candidates.len())))
        })
    }
}

pub struct Mentor {
    lookup: Arc<dyn LookupStore>,
}

impl Node for Mentor {
    fn run<'a>(
        &'a self,
        state: &'a State,
        _ctx: &'a NodeContext,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let goal = match state
                .get(CONTEXT)
                .and_then(|c| c.get("goal"))
                .and_then(Value::as_str)
            {
                Some(goal) => goal.to_string(),
                None => require_text(state, USER_INPUT)?,
            };
            let directory = self.lookup.search(&SearchCriteria::collection("mentors")).await?;
            let mentors = rank_mentors(&goal, &directory);
            Ok(StateUpdate::new()
                .set(
                    OUTPUT,
                    json!({"type": "mentor", "goal": goal, "mentors": mentors}),
                )
                .trace(format!("Mentor: {} recommendation(s)", mentors.len())))
        })
    }
}
