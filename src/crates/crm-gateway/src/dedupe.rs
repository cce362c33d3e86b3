//! Dedupe guard (§4.B).
//!
//! `SeenStore` mirrors the literal persistent contract from §6 ("Dedupe
//! table: `(hash primary key, created_at timestamp)`") rather than caching
//! results: the guarantee is at-most-one *execution*, not a response cache,
//! and the in-process reference impl below is a `dashmap`-backed stand-in
//! for the shared relational table production deployments provide.

use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::time::{Duration, Instant};

/// Default dedupe window for write operations (§4.B).
pub const DEFAULT_WRITE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[async_trait]
pub trait SeenStore: Send + Sync {
    /// `true` if `hash` was recorded within `window` of now.
    async fn seen_within(&self, hash: &str, window: Duration) -> Result<bool, String>;

    /// Record `hash` as seen at the current time. Insertion failure must
    /// never block the caller (§4.B: "dedupe is advisory, not
    /// authoritative") — callers log and proceed regardless of the result.
    async fn record(&self, hash: &str) -> Result<(), String>;
}

/// Reference `SeenStore`: a process-local map from hash to insertion
/// instant. A real deployment backs this with the shared table in §6;
/// everything above this trait is indifferent to which one is plugged in.
#[derive(Default)]
pub struct InMemorySeenStore {
    entries: DashMap<String, Instant>,
}

impl InMemorySeenStore {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }
}

#[async_trait]
impl SeenStore for InMemorySeenStore {
    async fn seen_within(&self, hash: &str, window: Duration) -> Result<bool, String> {
        Ok(self
            .entries
            .get(hash)
            .map(|inserted_at| inserted_at.elapsed() <= window)
            .unwrap_or(false))
    }

    async fn record(&self, hash: &str) -> Result<(), String> {
        self.entries.insert(hash.to_string(), Instant::now());
        Ok(())
    }
}

/// The outcome of `with_dedupe` (§4.B, §8 invariant 1).
#[derive(Debug, Clone)]
pub enum DedupeOutcome<T> {
    Executed { result: T },
    Skipped { reason: String },
}

impl<T> DedupeOutcome<T> {
    pub fn into_executed(self) -> Option<T> {
        match self {
            DedupeOutcome::Executed { result } => Some(result),
            DedupeOutcome::Skipped { .. } => None,
        }
    }

    pub fn was_executed(&self) -> bool {
        matches!(self, DedupeOutcome::Executed { .. })
    }
}

/// `withDedupe(payload, windowMs, fn)` (§4.B): hash the payload, consult the
/// seen table, and invoke `f` only if the hash was not already seen within
/// the window. The read-then-insert ordering (insert before invoking `f`)
/// is exactly the spec's prescribed sequence, and the race it leaves open
/// between two concurrent callers is explicitly accepted (§4.B: "duplicates
/// are possible ... this is acceptable").
pub async fn with_dedupe<F, Fut, T, E>(
    store: &dyn SeenStore,
    payload: &serde_json::Value,
    window: Duration,
    f: F,
) -> Result<DedupeOutcome<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let hash = crm_domain::dedupe_key(payload);

    match store.seen_within(&hash, window).await {
        Ok(true) => {
            return Ok(DedupeOutcome::Skipped {
                reason: "duplicate payload within dedupe window".to_string(),
            });
        }
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(hash = %hash, error = %err, "dedupe seen-table read failed, proceeding without guarantee");
        }
    }

    if let Err(err) = store.record(&hash).await {
        tracing::warn!(hash = %hash, error = %err, "dedupe seen-table insert failed, proceeding anyway");
    }

    let result = f().await?;
    Ok(DedupeOutcome::Executed { result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_call_within_window_is_skipped() {
        let store = InMemorySeenStore::new();
        let payload = json!({"subject": "Sync"});
        let calls = AtomicU32::new(0);

        let first: Result<DedupeOutcome<u32>, String> = with_dedupe(&store, &payload, DEFAULT_WRITE_WINDOW, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        })
        .await;
        assert!(first.unwrap().was_executed());

        let second: Result<DedupeOutcome<u32>, String> = with_dedupe(&store, &payload, DEFAULT_WRITE_WINDOW, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }
        })
        .await;
        assert!(!second.unwrap().was_executed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_payloads_both_execute() {
        let store = InMemorySeenStore::new();
        let a: Result<DedupeOutcome<u32>, String> =
            with_dedupe(&store, &json!({"subject": "A"}), DEFAULT_WRITE_WINDOW, || async { Ok(1) }).await;
        let b: Result<DedupeOutcome<u32>, String> =
            with_dedupe(&store, &json!({"subject": "B"}), DEFAULT_WRITE_WINDOW, || async { Ok(2) }).await;
        assert!(a.unwrap().was_executed());
        assert!(b.unwrap().was_executed());
    }

    #[tokio::test]
    async fn expired_window_allows_re_execution() {
        let store = InMemorySeenStore::new();
        let payload = json!({"subject": "Sync"});
        with_dedupe(&store, &payload, Duration::from_millis(10), || async { Ok::<_, String>(1) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = with_dedupe(&store, &payload, Duration::from_millis(10), || async { Ok::<_, String>(1) })
            .await
            .unwrap();
        assert!(second.was_executed());
    }
}
