//! Reference `MemoryProvider`: process-local, `DashMap`-backed, keyword-scored.
//!
//! Mirrors `crm_gateway::dedupe::InMemorySeenStore` — a workable default for
//! tests and single-process deployments, not a production memory store.

use crate::error::Result;
use crate::memory::{Memory, RecallOptions};
use crate::provider::MemoryProvider;
use async_trait::async_trait;
use chrono::Utc;
use crm_domain::{Message, OrgId, UserId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

fn key(org_id: &OrgId, user_id: &UserId) -> String {
    format!("{}:{}", org_id.as_str(), user_id.as_str())
}

fn keyword_score(query: &str, text: &str) -> f64 {
    let query_words: Vec<String> = query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let hits = query_words
        .iter()
        .filter(|w| text_lower.contains(w.as_str()))
        .count();
    hits as f64 / query_words.len() as f64
}

/// In-memory reference implementation of [`MemoryProvider`].
pub struct InMemoryMemoryProvider {
    rows: DashMap<String, Vec<Memory>>,
    next_id: AtomicU64,
}

impl InMemoryMemoryProvider {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("mem-{n}")
    }
}

impl Default for InMemoryMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryProvider for InMemoryMemoryProvider {
    async fn recall(
        &self,
        query: &str,
        org_id: &OrgId,
        user_id: &UserId,
        options: RecallOptions,
    ) -> Result<Vec<Memory>> {
        let bucket = key(org_id, user_id);
        let Some(rows) = self.rows.get(&bucket) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<Memory> = rows
            .iter()
            .map(|m| {
                let mut m = m.clone();
                m.score = keyword_score(query, &m.text);
                m
            })
            .filter(|m| m.score >= options.threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(options.limit);
        Ok(scored)
    }

    async fn synthesize(
        &self,
        messages: &[Message],
        org_id: &OrgId,
        user_id: &UserId,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let text = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let row = Memory {
            id: self.next_id(),
            text,
            score: 1.0,
            kind: "synthesized".to_string(),
            importance: 0.5,
            created_at: Utc::now(),
            metadata,
        };

        self.rows.entry(key(org_id, user_id)).or_default().push(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_domain::Message as DomainMessage;

    #[tokio::test]
    async fn recall_returns_empty_for_unknown_user() {
        let provider = InMemoryMemoryProvider::new();
        let org = OrgId::new("org1");
        let user = UserId::new("user1");
        let results = provider
            .recall("anything", &org, &user, RecallOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn synthesize_then_recall_round_trips() {
        let provider = InMemoryMemoryProvider::new();
        let org = OrgId::new("org1");
        let user = UserId::new("user1");
        let messages = vec![DomainMessage::assistant(
            "Scheduled a meeting with John tomorrow at 9am",
        )];

        provider
            .synthesize(&messages, &org, &user, None)
            .await
            .unwrap();

        let results = provider
            .recall("meeting John", &org, &user, RecallOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn recall_respects_threshold() {
        let provider = InMemoryMemoryProvider::new();
        let org = OrgId::new("org1");
        let user = UserId::new("user1");
        let messages = vec![DomainMessage::user("unrelated content about invoices")];
        provider.synthesize(&messages, &org, &user, None).await.unwrap();

        let results = provider
            .recall(
                "completely different meeting",
                &org,
                &user,
                RecallOptions {
                    limit: 5,
                    threshold: 0.5,
                },
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
