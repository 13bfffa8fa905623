use std::collections::HashMap;
use std::sync::Arc;

use crate::edge::{describe, Route};
use crate::node::Node;

/// An immutable, validated workflow graph.
///
/// Built once through [`GraphBuilder`](crate::GraphBuilder) and shared
/// across concurrent runs behind an `Arc`.
pub struct Graph {
    pub(crate) name: String,
    pub(crate) nodes: HashMap<String, Arc<dyn Node>>,
    /// Node names in registration order.
    pub(crate) order: Vec<String>,
    pub(crate) routes: HashMap<String, Route>,
    pub(crate) entry: String,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Registered node names, in registration order.
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(name)
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Human-readable outline: entry line, then one line per route.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("graph {} (entry: {})", self.name, self.entry)];
        for name in &self.order {
            if let Some(route) = self.routes.get(name) {
                lines.extend(describe(name, route).into_iter().map(|l| format!("  {}", l)));
            }
        }
        lines.join("\n")
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("routes", &self.routes)
            .finish()
    }
}
