//! Retry + circuit breaker composition (§4.C).
//!
//! Backoff loop grounded on `orchestrator/src/executor/retry.rs`'s
//! `retry_with_backoff`/`classify_error` shape (attempt loop, exponential
//! delay, logged classification), generalized from the teacher's single
//! `OrchestratorError::General(String)` substring matching to the richer
//! `GatewayError` shape and the spec's exact retryable-error grammar (§4.C).

use crate::circuit_breaker::{CircuitBreakerTable, CircuitRejection, CircuitState};
use crate::error::GatewayError;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

/// A pure function of error shape, independent of whether the error is
/// retryable — used for diagnostics and surfaced in `EnhancedError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    Network,
    Server,
    RateLimit,
    Client,
    Auth,
    Validation,
    Unknown,
}

fn retryable_message_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)passkey expired|rate limit|temporary failure").unwrap())
}

fn is_retryable_network_code(code: &str) -> bool {
    matches!(code, "ECONNRESET" | "ETIMEDOUT" | "ENOTFOUND" | "ECONNREFUSED")
}

pub fn classify_error(error: &GatewayError) -> ErrorClassification {
    match error {
        GatewayError::Network { .. } => ErrorClassification::Network,
        GatewayError::Timeout => ErrorClassification::Network,
        GatewayError::Credential(_) => ErrorClassification::Auth,
        GatewayError::InvalidResponse { message } => {
            if retryable_message_pattern().is_match(message) {
                ErrorClassification::RateLimit
            } else {
                ErrorClassification::Validation
            }
        }
        GatewayError::Http { status, message } => match status {
            401 | 403 => ErrorClassification::Auth,
            429 => ErrorClassification::RateLimit,
            408 => ErrorClassification::Network,
            s if *s >= 500 => ErrorClassification::Server,
            _ if retryable_message_pattern().is_match(message) => ErrorClassification::RateLimit,
            _ => ErrorClassification::Client,
        },
        GatewayError::CircuitOpen => ErrorClassification::Unknown,
        GatewayError::Transient { .. } => ErrorClassification::Server,
    }
}

/// The exact retryable grammar from §4.C: network codes, specific HTTP
/// statuses, or one of three known transient-message substrings — nothing
/// else is retried, regardless of `classify_error`'s verdict.
pub fn is_retryable(error: &GatewayError) -> bool {
    match error {
        GatewayError::Network { code } => is_retryable_network_code(code),
        GatewayError::Timeout => true,
        GatewayError::Http { status, message } => {
            matches!(status, 408 | 429) || *status >= 500 || retryable_message_pattern().is_match(message)
        }
        GatewayError::InvalidResponse { message } => retryable_message_pattern().is_match(message),
        GatewayError::Credential(_) => false,
        GatewayError::CircuitOpen | GatewayError::Transient { .. } => false,
    }
}

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MULTIPLIER: f64 = 2.0;
const MAX_DELAY: Duration = Duration::from_secs(30);

fn backoff_delay(attempt: u32) -> Duration {
    let raw = INITIAL_DELAY.as_secs_f64() * MULTIPLIER.powi(attempt as i32);
    Duration::from_secs_f64(raw.min(MAX_DELAY.as_secs_f64()))
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub operation: String,
    pub max_retries: u32,
    pub circuit_breaker_key: Option<String>,
}

impl RetryOptions {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            max_retries: 3,
            circuit_breaker_key: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_circuit_breaker_key(mut self, key: impl Into<String>) -> Self {
        self.circuit_breaker_key = Some(key.into());
        self
    }
}

/// A failed call's error enhanced with retry/circuit diagnostics (§4.C:
/// "Failed errors are enhanced with `{operation, attempts, classification,
/// circuitStates}` before surfacing").
#[derive(Debug, Clone)]
pub struct EnhancedError {
    pub operation: String,
    pub attempts: u32,
    pub classification: ErrorClassification,
    pub circuit_state: Option<CircuitState>,
    pub source: RetryFailure,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("circuit breaker rejected the call: {0}")]
    Circuit(#[from] CircuitRejection),
}

impl std::fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s) ({:?}): {}",
            self.operation, self.attempts, self.classification, self.source
        )
    }
}

impl std::error::Error for EnhancedError {}

/// Collapses retry/circuit diagnostics back down to a `GatewayError` for
/// callers (e.g. `crm-resolver`) that only need the error-handling-design
/// taxonomy kind (§7), not the full attempt/classification breakdown.
impl From<EnhancedError> for GatewayError {
    fn from(err: EnhancedError) -> Self {
        match err.source {
            RetryFailure::Circuit(_) => GatewayError::CircuitOpen,
            RetryFailure::Gateway(inner) if err.attempts <= 1 => inner,
            RetryFailure::Gateway(_) => GatewayError::Transient { attempts: err.attempts },
        }
    }
}

/// `executeWithRetry` (§4.C): admits through the circuit breaker (if a key
/// is given), retries retryable failures with exponential backoff up to
/// `max_retries`, and records every outcome against the breaker.
pub async fn execute_with_retry<F, Fut, T>(
    breakers: &CircuitBreakerTable,
    options: RetryOptions,
    mut f: F,
) -> Result<T, EnhancedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if let Some(key) = &options.circuit_breaker_key {
        if let Err(rejection) = breakers.admit(key) {
            return Err(EnhancedError {
                operation: options.operation.clone(),
                attempts: 0,
                classification: ErrorClassification::Unknown,
                circuit_state: Some(breakers.state_of(key)),
                source: rejection.into(),
            });
        }
    }

    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => {
                if let Some(key) = &options.circuit_breaker_key {
                    breakers.record_success(key);
                }
                return Ok(value);
            }
            Err(err) => {
                let classification = classify_error(&err);
                if let Some(key) = &options.circuit_breaker_key {
                    breakers.record_failure(key);
                }

                if attempt >= options.max_retries || !is_retryable(&err) {
                    return Err(EnhancedError {
                        operation: options.operation.clone(),
                        attempts: attempt + 1,
                        classification,
                        circuit_state: options.circuit_breaker_key.as_deref().map(|k| breakers.state_of(k)),
                        source: err.into(),
                    });
                }

                let delay = backoff_delay(attempt);
                tracing::warn!(
                    operation = %options.operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    classification = ?classification,
                    "retrying gateway call after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(key: Option<&str>) -> RetryOptions {
        let mut options = RetryOptions::new("test_op").with_max_retries(3);
        if let Some(key) = key {
            options = options.with_circuit_breaker_key(key);
        }
        options
    }

    #[test]
    fn classifies_auth_and_rate_limit_and_server() {
        assert_eq!(
            classify_error(&GatewayError::Http { status: 401, message: "no".into() }),
            ErrorClassification::Auth
        );
        assert_eq!(
            classify_error(&GatewayError::Http { status: 429, message: "slow down".into() }),
            ErrorClassification::RateLimit
        );
        assert_eq!(
            classify_error(&GatewayError::Http { status: 503, message: "oops".into() }),
            ErrorClassification::Server
        );
    }

    #[test]
    fn retryable_grammar_matches_spec_list() {
        assert!(is_retryable(&GatewayError::Network { code: "ECONNRESET".into() }));
        assert!(!is_retryable(&GatewayError::Network { code: "EACCES".into() }));
        assert!(is_retryable(&GatewayError::Http { status: 429, message: String::new() }));
        assert!(is_retryable(&GatewayError::Http { status: 500, message: String::new() }));
        assert!(!is_retryable(&GatewayError::Http { status: 400, message: String::new() }));
        assert!(is_retryable(&GatewayError::InvalidResponse { message: "PassKey expired".into() }));
        assert!(!is_retryable(&GatewayError::Credential("nope".into())));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let breakers = CircuitBreakerTable::new();
        let attempts = AtomicU32::new(0);
        let result = execute_with_retry(&breakers, fast_options(None), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::Http { status: 500, message: "retry me".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let breakers = CircuitBreakerTable::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&breakers, fast_options(None), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayError::Http { status: 400, message: "bad".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_rejects_before_calling_f() {
        let breakers = CircuitBreakerTable::new();
        for _ in 0..5 {
            breakers.admit("bsa_workflow").unwrap();
            breakers.record_failure("bsa_workflow");
        }
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = execute_with_retry(&breakers, fast_options(Some("bsa_workflow")), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn enhanced_error_carries_attempts_and_classification() {
        let breakers = CircuitBreakerTable::new();
        let result: Result<(), EnhancedError> = execute_with_retry(&breakers, fast_options(None), || async {
            Err(GatewayError::Http { status: 503, message: "down".into() })
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4); // initial + 3 retries
        assert_eq!(err.classification, ErrorClassification::Server);
    }
}
