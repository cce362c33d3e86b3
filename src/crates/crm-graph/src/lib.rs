//! # crm-graph - node-graph execution engine
//!
//! The domain-agnostic machinery the four CRM domain state machines
//! (`crm-subgraphs`) are built on: a node-and-edge topology builder
//! ([`StateGraph`]), channel-backed state threaded between nodes
//! ([`ChannelStore`], reusing [`crm_checkpoint::Channel`]), and a
//! step-by-step executor ([`CompiledGraph`]) that runs a node, applies its
//! updates, and either follows an edge to the next node or suspends the run
//! and checkpoints it for later resume.
//!
//! This is a single-threaded cooperative interpreter (one node per step, no
//! Pregel-style superstep barrier) — the concurrency in this system lives
//! one layer up, where the coordinator runs sibling domain graphs
//! concurrently for a plan's `parallel` group.

pub mod channel_store;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod node_result;
pub mod retry;

pub use channel_store::ChannelStore;
pub use compiled::{CompiledGraph, ExecutionOutcome, GraphDescription};
pub use error::{GraphError, Result};
pub use graph::{ChannelKind, GraphNode, StateGraph, SyncNode};
pub use node_result::{ChannelUpdates, Command, NodeResult, Suspend};
pub use retry::RetryPolicy;
