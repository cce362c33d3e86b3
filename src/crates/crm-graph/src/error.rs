//! Error types for graph construction and execution.

use thiserror::Error;

/// Result type used throughout the graph engine.
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("no outgoing edge defined for node {0}")]
    NoEdge(String),

    #[error("conditional edge from {0} routed to unknown node {1}")]
    InvalidRoute(String, String),

    #[error("graph contains a cycle reachable from entry node {0}")]
    Cycle(String),

    #[error("channel error: {0}")]
    Channel(#[from] crm_checkpoint::CheckpointError),

    #[error("node execution failed: {0}")]
    Execution(String),

    #[error("no checkpoint found to resume thread {0}")]
    NoCheckpointToResume(String),

    #[error("resume payload did not match the suspended node's expectations: {0}")]
    InvalidResume(String),
}
