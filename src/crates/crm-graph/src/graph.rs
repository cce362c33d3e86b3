//! `StateGraph`: the builder for a domain's node topology.
//!
//! A graph is nodes plus edges plus channel declarations. It says nothing
//! about execution order beyond topology — `compile()` hands that off to
//! `CompiledGraph`, which actually walks the edges at run time.

use crate::channel_store::ChannelStore;
use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::node_result::{ChannelUpdates, NodeResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A single step in a domain's topology.
///
/// Node bodies are almost always pure functions of the current channel
/// values; a handful (resolver lookups, gateway effects) are genuinely
/// asynchronous, so the trait is async rather than a plain closure type.
#[async_trait]
pub trait GraphNode: Send + Sync {
    async fn run(&self, channels: &ChannelStore) -> Result<NodeResult>;
}

/// Adapter for the common case: a synchronous closure over the channel
/// store. Most domain nodes (parsing, validation, preview generation) fit
/// this shape; only resolver/gateway-calling nodes need a hand-written
/// `GraphNode` impl.
pub struct SyncNode<F>(F)
where
    F: Fn(&ChannelStore) -> Result<NodeResult> + Send + Sync;

impl<F> SyncNode<F>
where
    F: Fn(&ChannelStore) -> Result<NodeResult> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> GraphNode for SyncNode<F>
where
    F: Fn(&ChannelStore) -> Result<NodeResult> + Send + Sync,
{
    async fn run(&self, channels: &ChannelStore) -> Result<NodeResult> {
        (self.0)(channels)
    }
}

/// How a channel merges concurrent writes, by name, since the concrete
/// `crm_checkpoint::Channel` impl is picked at graph-build time rather than
/// hardcoded per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Last non-null write wins (the default for most channels).
    LastValue,
    /// Append-only; every write is kept in order.
    Topic,
    /// Object-union merge: later keys overwrite earlier ones, others survive.
    ObjectUnion,
}

impl ChannelKind {
    pub fn instantiate(self) -> Box<dyn crm_checkpoint::Channel> {
        use crm_checkpoint::{BinaryOperatorChannel, LastValueChannel, TopicChannel};
        match self {
            ChannelKind::LastValue => Box::new(LastValueChannel::new()),
            ChannelKind::Topic => Box::new(TopicChannel::new()),
            ChannelKind::ObjectUnion => Box::new(BinaryOperatorChannel::new(|a, b| {
                let mut merged = match a {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                if let serde_json::Value::Object(incoming) = b {
                    for (k, v) in incoming {
                        merged.insert(k, v);
                    }
                }
                serde_json::Value::Object(merged)
            })),
        }
    }
}

enum Edge {
    Static(String),
    Conditional(Arc<dyn Fn(&ChannelStore) -> String + Send + Sync>),
}

/// Builder for a domain's node graph.
pub struct StateGraph {
    nodes: HashMap<String, Arc<dyn GraphNode>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    terminal: HashSet<String>,
    channels: Vec<(String, ChannelKind)>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            terminal: HashSet::new(),
            channels: Vec::new(),
        }
    }

    pub fn add_channel(mut self, name: impl Into<String>, kind: ChannelKind) -> Self {
        self.channels.push((name.into(), kind));
        self
    }

    pub fn add_node(mut self, name: impl Into<String>, node: Arc<dyn GraphNode>) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }

    pub fn add_sync_node<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ChannelStore) -> Result<NodeResult> + Send + Sync + 'static,
    {
        self.add_node(name, Arc::new(SyncNode::new(f)))
    }

    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn set_terminal(mut self, name: impl Into<String>) -> Self {
        self.terminal.insert(name.into());
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::Static(to.into()));
        self
    }

    pub fn add_conditional_edge<F>(mut self, from: impl Into<String>, router: F) -> Self
    where
        F: Fn(&ChannelStore) -> String + Send + Sync + 'static,
    {
        self.edges
            .insert(from.into(), Edge::Conditional(Arc::new(router)));
        self
    }

    /// Validate topology and produce an executable graph.
    pub fn compile(self) -> Result<CompiledGraph> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| GraphError::Execution("no entry point set".to_string()))?;

        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::NodeNotFound(entry));
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::NodeNotFound(from.clone()));
            }
            if let Edge::Static(to) = edge {
                if !self.nodes.contains_key(to) {
                    return Err(GraphError::InvalidRoute(from.clone(), to.clone()));
                }
            }
        }

        for node in self.nodes.keys() {
            if !self.terminal.contains(node) && !self.edges.contains_key(node) {
                return Err(GraphError::NoEdge(node.clone()));
            }
        }

        Ok(CompiledGraph::new(
            self.nodes,
            self.edges.into_iter().map(|(k, v)| (k, v.into())).collect(),
            entry,
            self.terminal,
            self.channels,
        ))
    }
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal edge representation shared with `compiled`.
pub(crate) enum CompiledEdge {
    Static(String),
    Conditional(Arc<dyn Fn(&ChannelStore) -> String + Send + Sync>),
}

impl From<Edge> for CompiledEdge {
    fn from(e: Edge) -> Self {
        match e {
            Edge::Static(s) => CompiledEdge::Static(s),
            Edge::Conditional(f) => CompiledEdge::Conditional(f),
        }
    }
}

impl CompiledEdge {
    pub(crate) fn route(&self, channels: &ChannelStore) -> String {
        match self {
            CompiledEdge::Static(to) => to.clone(),
            CompiledEdge::Conditional(f) => f(channels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_result::ChannelUpdates;
    use serde_json::json;

    #[tokio::test]
    async fn compile_rejects_missing_entry() {
        let result = StateGraph::new()
            .add_sync_node("a", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_terminal("a")
            .compile();
        assert!(matches!(result, Err(GraphError::Execution(_))));
    }

    #[tokio::test]
    async fn compile_rejects_dangling_static_edge() {
        let result = StateGraph::new()
            .add_sync_node("a", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_entry_point("a")
            .add_edge("a", "missing")
            .compile();
        assert!(matches!(result, Err(GraphError::InvalidRoute(_, _))));
    }

    #[tokio::test]
    async fn compile_rejects_node_with_no_edge_or_terminal() {
        let result = StateGraph::new()
            .add_sync_node("a", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_entry_point("a")
            .compile();
        assert!(matches!(result, Err(GraphError::NoEdge(_))));
    }

    #[tokio::test]
    async fn minimal_two_node_graph_compiles() {
        let result = StateGraph::new()
            .add_channel("response", ChannelKind::LastValue)
            .add_sync_node("a", |_| {
                let mut u = ChannelUpdates::new();
                u.insert("response".into(), json!("from a"));
                Ok(NodeResult::update(u))
            })
            .add_sync_node("b", |_| Ok(NodeResult::update(ChannelUpdates::new())))
            .set_entry_point("a")
            .add_edge("a", "b")
            .set_terminal("b")
            .compile();
        assert!(result.is_ok());
    }
}
