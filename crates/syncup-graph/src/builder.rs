use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::warn;

use syncup_core::error::{GraphError, Result};
use syncup_core::state::State;

use crate::edge::{Route, RouteLabel, END};
use crate::graph::Graph;
use crate::node::Node;

/// Assembles a [`Graph`].
///
/// Every method consumes and returns the builder. Problems found while
/// registering (a duplicate node, a second route for one node) are held
/// back and reported by [`build`](Self::build); the first one wins.
pub struct GraphBuilder {
    name: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    order: Vec<String>,
    routes: Vec<(String, Route)>,
    entry: Option<String>,
    error: Option<GraphError>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            routes: Vec::new(),
            entry: None,
            error: None,
        }
    }

    pub fn register_node(self, name: impl Into<String>, node: impl Node) -> Self {
        self.register_arc(name, Arc::new(node))
    }

    /// Register an already shared node.
    pub fn register_arc(mut self, name: impl Into<String>, node: Arc<dyn Node>) -> Self {
        let name = name.into();
        if name.is_empty() || name == END {
            self.fail(GraphError::ReservedName(name));
        } else if self.nodes.contains_key(&name) {
            self.fail(GraphError::DuplicateNode(name));
        } else {
            self.order.push(name.clone());
            self.nodes.insert(name, node);
        }
        self
    }

    pub fn add_unconditional_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let to = to.into();
        self.add_route(from.into(), Route::Unconditional(to))
    }

    /// Route `from` by a label computed from the merged state.
    ///
    /// `targets` must cover every variant in `L::ALL`.
    pub fn add_conditional_edges<L, R, I, T>(
        mut self,
        from: impl Into<String>,
        router: R,
        targets: I,
    ) -> Self
    where
        L: RouteLabel,
        R: Fn(&State) -> L + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        T: Into<String>,
    {
        let from = from.into();
        let mut mapped: Vec<(&'static str, String)> = Vec::new();
        for (label, to) in targets {
            let label = label.as_label();
            if mapped.iter().any(|(l, _)| *l == label) {
                self.fail(GraphError::DuplicateLabel {
                    node: from.clone(),
                    label: label.to_string(),
                });
                return self;
            }
            mapped.push((label, to.into()));
        }

        // Order targets like the label type, checking coverage as we go.
        let mut ordered = Vec::with_capacity(L::ALL.len());
        for label in L::ALL {
            let label = label.as_label();
            match mapped.iter().position(|(l, _)| *l == label) {
                Some(idx) => ordered.push(mapped.swap_remove(idx)),
                None => {
                    self.fail(GraphError::UnmappedLabel {
                        node: from.clone(),
                        label: label.to_string(),
                    });
                    return self;
                }
            }
        }
        // Labels outside L::ALL can never be emitted; keep them last.
        ordered.extend(mapped);

        let router = Arc::new(move |state: &State| router(state).as_label());
        self.add_route(
            from,
            Route::Conditional {
                router,
                targets: ordered,
            },
        )
    }

    /// Every target becomes a branch over the shared state.
    pub fn add_fanout_edges<I, T>(mut self, from: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let from = from.into();
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            self.fail(GraphError::EmptyFanOut(from));
            return self;
        }
        self.add_route(from, Route::FanOut(targets))
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<Graph> {
        if let Some(err) = self.error {
            return Err(err.into());
        }

        let entry = self
            .entry
            .ok_or_else(|| GraphError::MissingEntry(self.name.clone()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry).into());
        }

        let mut routes = HashMap::with_capacity(self.routes.len());
        for (from, route) in self.routes {
            for to in route.successors() {
                if !self.nodes.contains_key(&from) || (to != END && !self.nodes.contains_key(to))
                {
                    return Err(GraphError::UnknownNode {
                        from: from.clone(),
                        to: to.to_string(),
                    }
                    .into());
                }
            }
            routes.insert(from, route);
        }

        if let Some(orphan) = self.order.iter().find(|n| !routes.contains_key(*n)) {
            return Err(GraphError::NoRoute(orphan.clone()).into());
        }

        // Walk predecessors backwards from END; anything not reached loops forever.
        let mut reaches_end: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = VecDeque::from([END]);
        while let Some(target) = frontier.pop_front() {
            for (from, route) in &routes {
                if !reaches_end.contains(from.as_str()) && route.successors().contains(&target) {
                    reaches_end.insert(from.as_str());
                    frontier.push_back(from.as_str());
                }
            }
        }
        if let Some(stuck) = self.order.iter().find(|n| !reaches_end.contains(n.as_str())) {
            return Err(GraphError::TerminalUnreachable(stuck.clone()).into());
        }

        let reachable = reachable_from(&entry, &routes);
        for name in self.order.iter().filter(|n| !reachable.contains(n.as_str())) {
            warn!(graph = %self.name, node = %name, "Node is not reachable from the entry");
        }

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            order: self.order,
            routes,
            entry,
        })
    }

    fn add_route(mut self, from: String, route: Route) -> Self {
        if self.routes.iter().any(|(f, _)| *f == from) {
            self.fail(GraphError::DuplicateRoute(from));
        } else {
            self.routes.push((from, route));
        }
        self
    }

    fn fail(&mut self, err: GraphError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

fn reachable_from<'a>(entry: &'a str, routes: &'a HashMap<String, Route>) -> HashSet<&'a str> {
    let mut seen = HashSet::from([entry]);
    let mut frontier = vec![entry];
    while let Some(node) = frontier.pop() {
        if let Some(route) = routes.get(node) {
            for next in route.successors() {
                if next != END && seen.insert(next) {
                    frontier.push(next);
                }
            }
        }
    }
    seen
}
