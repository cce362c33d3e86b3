//! Error taxonomy for the coordinator's run loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("graph error: {0}")]
    Graph(#[from] crm_graph::error::GraphError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] crm_checkpoint::CheckpointError),

    #[error("resolver error: {0}")]
    Resolver(#[from] crm_resolver::ResolverError),

    #[error("no pending run for checkpoint {0}")]
    UnknownCheckpoint(String),

    #[error("resume payload does not match the interrupt awaiting resolution: {0}")]
    MismatchedResume(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
