use std::fmt;
use std::sync::Arc;

use syncup_core::state::State;

/// Terminal marker. Routing to it halts the current branch.
pub const END: &str = "__end__";

/// A closed set of router labels.
///
/// Conditional routes are keyed by a label type so the builder can check,
/// before any run starts, that every label the router may produce has a
/// target.
///
/// ```
/// use syncup_graph::RouteLabel;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Decision { Yes, No }
///
/// impl RouteLabel for Decision {
///     const ALL: &'static [Self] = &[Decision::Yes, Decision::No];
///     fn as_label(&self) -> &'static str {
///         match self {
///             Decision::Yes => "yes",
///             Decision::No => "no",
///         }
///     }
/// }
/// ```
pub trait RouteLabel: Copy + Send + Sync + 'static {
    /// Every label the router may emit.
    const ALL: &'static [Self];

    fn as_label(&self) -> &'static str;
}

pub(crate) type Router = Arc<dyn Fn(&State) -> &'static str + Send + Sync>;

/// Outgoing route of a single node.
#[derive(Clone)]
pub enum Route {
    /// Exactly one successor (or [`END`]).
    Unconditional(String),
    /// Router label selects one successor.
    Conditional {
        router: Router,
        /// Label to target, in the label type's declaration order.
        targets: Vec<(&'static str, String)>,
    },
    /// Every successor becomes an active branch, in declared order.
    FanOut(Vec<String>),
}

/// Where a node's route sends the run after a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Label produced by a conditional router.
    pub label: Option<&'static str>,
    /// Successors to enqueue. May contain [`END`].
    pub next: Vec<String>,
}

impl Route {
    /// Every target this route can lead to, with duplicates removed.
    pub fn successors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let all: Box<dyn Iterator<Item = &String>> = match self {
            Route::Unconditional(to) => Box::new(std::iter::once(to)),
            Route::Conditional { targets, .. } => Box::new(targets.iter().map(|(_, t)| t)),
            Route::FanOut(to) => Box::new(to.iter()),
        };
        for t in all {
            if !out.contains(&t.as_str()) {
                out.push(t);
            }
        }
        out
    }

    /// Evaluate the route against the state after the node's merge.
    ///
    /// Fails only when a router emits a label with no target.
    pub fn resolve(&self, state: &State) -> Result<Step, String> {
        match self {
            Route::Unconditional(to) => Ok(Step {
                label: None,
                next: vec![to.clone()],
            }),
            Route::Conditional { router, targets } => {
                let label = router(state);
                targets
                    .iter()
                    .find(|(l, _)| *l == label)
                    .map(|(_, to)| Step {
                        label: Some(label),
                        next: vec![to.clone()],
                    })
                    .ok_or_else(|| format!("router emitted unmapped label '{}'", label))
            }
            Route::FanOut(to) => Ok(Step {
                label: None,
                next: to.clone(),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Route::Unconditional(_) => "unconditional",
            Route::Conditional { .. } => "conditional",
            Route::FanOut(_) => "fan_out",
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Unconditional(to) => f.debug_tuple("Unconditional").field(to).finish(),
            Route::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
            Route::FanOut(to) => f.debug_tuple("FanOut").field(to).finish(),
        }
    }
}

fn display_target(t: &str) -> &str {
    if t == END {
        "END"
    } else {
        t
    }
}

/// Renders one line per route, e.g. `evaluate -[approved]-> strategy_plan`.
pub(crate) fn describe(from: &str, route: &Route) -> Vec<String> {
    match route {
        Route::Unconditional(to) => vec![format!("{} -> {}", from, display_target(to))],
        Route::Conditional { targets, .. } => targets
            .iter()
            .map(|(label, to)| format!("{} -[{}]-> {}", from, label, display_target(to)))
            .collect(),
        Route::FanOut(to) => vec![format!(
            "{} => {}",
            from,
            to.iter()
                .map(|t| display_target(t))
                .collect::<Vec<_>>()
                .join(", ")
        )],
    }
}
