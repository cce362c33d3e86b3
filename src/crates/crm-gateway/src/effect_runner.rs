//! The effect runner (§4.D): the one place dedupe, retry, and the circuit
//! breaker compose around a gateway call. State machines never call
//! `CrmGateway` directly — they go through `EffectRunner::write`/`read`.

use crate::circuit_breaker::CircuitBreakerTable;
use crate::dedupe::{with_dedupe, DedupeOutcome, InMemorySeenStore, SeenStore, DEFAULT_WRITE_WINDOW};
use crate::error::GatewayError;
use crate::gateway::CrmGateway;
use crate::retry::{execute_with_retry, EnhancedError, RetryOptions};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Composes a `CrmGateway` with the dedupe guard and the retry/circuit
/// breaker layer. One instance per coordinator process, shared across runs.
pub struct EffectRunner {
    gateway: Arc<CrmGateway>,
    seen_store: Arc<dyn SeenStore>,
    breakers: Arc<CircuitBreakerTable>,
    dedupe_window: Duration,
}

impl EffectRunner {
    pub fn new(gateway: Arc<CrmGateway>, breakers: Arc<CircuitBreakerTable>) -> Self {
        Self {
            gateway,
            seen_store: Arc::new(InMemorySeenStore::new()),
            breakers,
            dedupe_window: DEFAULT_WRITE_WINDOW,
        }
    }

    pub fn with_seen_store(mut self, seen_store: Arc<dyn SeenStore>) -> Self {
        self.seen_store = seen_store;
        self
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    pub fn gateway(&self) -> &CrmGateway {
        &self.gateway
    }

    /// §4.D composes dedupe and retry around a gateway call. Dedupe gates
    /// the whole logical write exactly once — the hash is checked and
    /// recorded a single time per call to `write` — and retry wraps only
    /// the actual attempt loop inside that gate. Nesting it the other way
    /// (dedupe re-checked on every retry attempt) would record the hash as
    /// seen on attempt one and then have every retry of the same write
    /// silently skipped as a duplicate, which defeats retry entirely; this
    /// ordering is the one that actually delivers "at most one execution
    /// per payload within the window" without breaking "retry a failed
    /// attempt".
    pub async fn write<F, Fut, T>(
        &self,
        operation: &str,
        circuit_key: &str,
        payload: serde_json::Value,
        call: F,
    ) -> Result<DedupeOutcome<T>, EnhancedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let options = RetryOptions::new(operation).with_circuit_breaker_key(circuit_key);
        with_dedupe(self.seen_store.as_ref(), &payload, self.dedupe_window, || {
            execute_with_retry(&self.breakers, options, &call)
        })
        .await
    }

    /// Reads bypass the dedupe guard (§4.D: "Reads bypass the dedupe
    /// guard") but still go through retry and the circuit breaker.
    pub async fn read<F, Fut, T>(&self, operation: &str, circuit_key: &str, call: F) -> Result<T, EnhancedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let options = RetryOptions::new(operation).with_circuit_breaker_key(circuit_key);
        execute_with_retry(&self.breakers, options, &call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentialProvider;
    use crate::transport::RecordingTransport;
    use crm_domain::OrgId;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner_with(transport: Arc<RecordingTransport>) -> EffectRunner {
        let gateway = Arc::new(CrmGateway::new(
            transport,
            Arc::new(StaticCredentialProvider::new("tok")),
            OrgId::from("org-1"),
        ));
        EffectRunner::new(gateway, Arc::new(CircuitBreakerTable::new()))
    }

    #[tokio::test]
    async fn write_skips_duplicate_payload_within_window() {
        let transport = Arc::new(RecordingTransport::new());
        let runner = runner_with(transport);
        let payload = serde_json::json!({"subject": "Sync"});
        let calls = AtomicU32::new(0);

        let first = runner
            .write("appointments.create", "bsa_workflow", payload.clone(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(serde_json::json!({"id": "a-1"}))
            })
            .await
            .unwrap();
        assert!(first.was_executed());

        let second = runner
            .write("appointments.create", "bsa_workflow", payload.clone(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(serde_json::json!({"id": "a-1"}))
            })
            .await
            .unwrap();
        assert!(!second.was_executed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_bypasses_dedupe_and_runs_every_time() {
        let transport = Arc::new(RecordingTransport::new());
        let runner = runner_with(transport);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            runner
                .read("appointments.list", "bsa_workflow", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, GatewayError>(serde_json::json!([]))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
