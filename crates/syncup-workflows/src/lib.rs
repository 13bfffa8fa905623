//! The SyncUp workflows: hackathon planning (bounded refine/evaluate cycle
//! plus fan-out), career development (linear), and a routing assistant.

pub mod assistant;
pub mod career;
pub mod hackathon;
pub mod lookup;
pub mod parse;
pub mod scoring;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use syncup_core::error::{Result, SyncupError};
use syncup_core::state::State;
use syncup_core::traits::{LlmClient, LookupStore};
use syncup_graph::Graph;

pub use lookup::JsonDirectoryLookup;

/// External services the workflow nodes call.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub lookup: Arc<dyn LookupStore>,
}

impl Collaborators {
    pub fn new(llm: Arc<dyn LlmClient>, lookup: Arc<dyn LookupStore>) -> Self {
        Self { llm, lookup }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Hackathon,
    Career,
    Assistant,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [
        WorkflowKind::Hackathon,
        WorkflowKind::Career,
        WorkflowKind::Assistant,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::Hackathon => "hackathon",
            WorkflowKind::Career => "career",
            WorkflowKind::Assistant => "assistant",
        }
    }

    /// Seed fields a run must start with.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            WorkflowKind::Hackathon => &[hackathon::GOAL, hackathon::DURATION],
            WorkflowKind::Career => &[career::INPUT_TYPE, career::INPUT_DATA],
            WorkflowKind::Assistant => &[assistant::USER_INPUT],
        }
    }

    pub fn build(&self, collab: &Collaborators) -> Result<Graph> {
        match self {
            WorkflowKind::Hackathon => hackathon::build(collab),
            WorkflowKind::Career => career::build(collab),
            WorkflowKind::Assistant => assistant::build(collab),
        }
    }

    /// Turn caller input into the initial state, checking required fields.
    pub fn seed(&self, input: Value) -> Result<State> {
        let state = State::from_value(input)?;
        let missing: Vec<&str> = self
            .required_fields()
            .iter()
            .copied()
            .filter(|f| !state.contains(f))
            .collect();
        if !missing.is_empty() {
            return Err(SyncupError::Config(format!(
                "{} input is missing: {}",
                self.name(),
                missing.join(", ")
            )));
        }
        Ok(state)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkflowKind {
    type Err = SyncupError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SyncupError::Config(format!(
                    "unknown workflow '{}' (expected hackathon, career, or assistant)",
                    s
                ))
            })
    }
}

/// A required field rendered as text. Numbers are accepted, so
/// `"duration": 3` and `"duration": "3"` read the same.
pub(crate) fn require_text(state: &State, key: &str) -> Result<String> {
    match state.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(SyncupError::MissingField(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Career".parse::<WorkflowKind>().unwrap(), WorkflowKind::Career);
        assert!("payroll".parse::<WorkflowKind>().is_err());
    }

    #[test]
    fn test_seed_checks_required_fields() {
        let state = WorkflowKind::Hackathon
            .seed(json!({"goal": "healthcare", "duration": 3}))
            .unwrap();
        assert_eq!(state.get_str("goal"), Some("healthcare"));

        let err = WorkflowKind::Hackathon
            .seed(json!({"goal": "healthcare"}))
            .unwrap_err();
        assert!(err.to_string().contains("duration"));

        assert!(WorkflowKind::Assistant.seed(json!("hi")).is_err());
    }

    #[test]
    fn test_require_text() {
        let state = State::new().with("n", 3).with("s", "x").with("blank", " ");
        assert_eq!(require_text(&state, "n").unwrap(), "3");
        assert_eq!(require_text(&state, "s").unwrap(), "x");
        assert!(matches!(
            require_text(&state, "blank"),
            Err(SyncupError::MissingField(_))
        ));
        assert!(require_text(&state, "absent").is_err());
    }
}
