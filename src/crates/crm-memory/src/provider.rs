//! The pluggable memory backend seam and the non-fatal wrappers around it.

use crate::error::Result;
use crate::memory::{Memory, RecallOptions};
use async_trait::async_trait;
use crm_domain::{Message, OrgId, UserId};
use tracing::warn;

/// A memory backend. The coordinator holds one instance per process; domain
/// subgraphs never see this trait directly, only the free functions below.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn recall(
        &self,
        query: &str,
        org_id: &OrgId,
        user_id: &UserId,
        options: RecallOptions,
    ) -> Result<Vec<Memory>>;

    async fn synthesize(
        &self,
        messages: &[Message],
        org_id: &OrgId,
        user_id: &UserId,
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// `recall(query, orgId, userId, {limit, threshold}) → [Memory]`.
///
/// Non-fatal: a backend failure is logged and treated as zero recalled
/// memories. No core invariant depends on memory availability.
pub async fn recall(
    provider: &dyn MemoryProvider,
    query: &str,
    org_id: &OrgId,
    user_id: &UserId,
    options: RecallOptions,
) -> Vec<Memory> {
    match provider.recall(query, org_id, user_id, options).await {
        Ok(memories) => memories,
        Err(err) => {
            warn!(error = %err, %org_id, %user_id, "memory recall failed, continuing without context");
            Vec::new()
        }
    }
}

/// `synthesize(messages, orgId, userId, metadata) → void`.
///
/// Called only from terminal nodes, after a successful commit. Non-fatal.
pub async fn synthesize(
    provider: &dyn MemoryProvider,
    messages: &[Message],
    org_id: &OrgId,
    user_id: &UserId,
    metadata: Option<serde_json::Value>,
) {
    if let Err(err) = provider.synthesize(messages, org_id, user_id, metadata).await {
        warn!(error = %err, %org_id, %user_id, "memory synthesis failed, continuing");
    }
}
