//! `CompiledGraph`'s static shape: nodes, edges, channel specs, and the
//! introspection surface used for diagnostics and property tests.

use crate::graph::{ChannelKind, CompiledEdge, GraphNode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Node list plus edges, rendered for attaching to coordinator diagnostic
/// output (`executionPlan`) and for debugging. The teacher's
/// `langgraph-core::visualization` module does the same job at far larger
/// scope (DOT/Mermaid rendering); this is the minimal analog this workspace
/// needs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphDescription {
    pub entry: String,
    pub nodes: Vec<String>,
    pub terminal: Vec<String>,
    /// `(from, to)` pairs for statically-routed edges; conditional edges are
    /// rendered as `(from, "*conditional*")` since their real target depends
    /// on runtime channel state.
    pub edges: Vec<(String, String)>,
}

pub struct CompiledGraph {
    pub(crate) nodes: HashMap<String, Arc<dyn GraphNode>>,
    pub(crate) edges: HashMap<String, CompiledEdge>,
    pub(crate) entry: String,
    pub(crate) terminal: HashSet<String>,
    pub(crate) channel_specs: Vec<(String, ChannelKind)>,
    pub(crate) max_steps: usize,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn GraphNode>>,
        edges: HashMap<String, CompiledEdge>,
        entry: String,
        terminal: HashSet<String>,
        channel_specs: Vec<(String, ChannelKind)>,
    ) -> Self {
        Self {
            nodes,
            edges,
            entry,
            terminal,
            channel_specs,
            max_steps: 128,
        }
    }

    /// Override the runaway-loop guard (default 128 steps). Domain graphs in
    /// this workspace top out around a dozen nodes; a caller with an
    /// unusually long workflow subgraph can raise this.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn describe(&self) -> GraphDescription {
        let edges = self
            .edges
            .iter()
            .map(|(from, edge)| {
                let to = match edge {
                    CompiledEdge::Static(to) => to.clone(),
                    CompiledEdge::Conditional(_) => "*conditional*".to_string(),
                };
                (from.clone(), to)
            })
            .collect();

        GraphDescription {
            entry: self.entry.clone(),
            nodes: self.nodes.keys().cloned().collect(),
            terminal: self.terminal.iter().cloned().collect(),
            edges,
        }
    }

    /// Every node name reachable from `from` by following static edges.
    /// Conditional edges fan out to every node mentioned as a target
    /// elsewhere in the graph is undecidable statically, so this only
    /// certifies static reachability — enough for the invariant this
    /// supports (`a node returning {error} is followed by exactly one
    /// subsequent node`), which is itself a static edge.
    pub fn reachable_from(&self, from: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![from.to_string()];
        let mut out = Vec::new();

        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            if node != from {
                out.push(node.clone());
            }
            if let Some(CompiledEdge::Static(to)) = self.edges.get(&node) {
                stack.push(to.clone());
            }
        }

        out
    }

    pub fn entry_point(&self) -> &str {
        &self.entry
    }

    pub fn is_terminal(&self, node: &str) -> bool {
        self.terminal.contains(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateGraph;
    use crate::node_result::{ChannelUpdates, NodeResult};

    #[test]
    fn describe_lists_nodes_and_static_edges() {
        let compiled = StateGraph::new()
            .add_sync_node("a", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .add_sync_node("b", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_entry_point("a")
            .add_edge("a", "b")
            .set_terminal("b")
            .compile()
            .unwrap();

        let description = compiled.describe();
        assert_eq!(description.entry, "a");
        assert_eq!(description.terminal, vec!["b".to_string()]);
        assert!(description.edges.contains(&("a".to_string(), "b".to_string())));
    }

    #[test]
    fn reachable_from_follows_static_chain() {
        let compiled = StateGraph::new()
            .add_sync_node("a", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .add_sync_node("b", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .add_sync_node("c", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_entry_point("a")
            .add_edge("a", "b")
            .add_edge("b", "c")
            .set_terminal("c")
            .compile()
            .unwrap();

        let reachable = compiled.reachable_from("a");
        assert_eq!(reachable, vec!["b".to_string(), "c".to_string()]);
    }
}
