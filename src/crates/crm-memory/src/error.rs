//! Error taxonomy for memory providers.

use thiserror::Error;

/// What a [`crate::MemoryProvider`] backend can fail with. Neither `recall`
/// nor `synthesize` ever surface this to a domain subgraph — see
/// [`crate::recall`]/[`crate::synthesize`], which swallow it and log.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MemoryError {
    #[error("memory backend unavailable: {0}")]
    Unavailable(String),

    #[error("memory backend rejected the request: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
