//! # crm-gateway — CRM transport, dedupe guard, retry/circuit-breaker, effect runner
//!
//! This crate is the only place in the workspace that talks to the external
//! CRM. It implements §4.A–D of the architecture:
//!
//! - [`transport`]: `CrmTransport`, the wire-format-agnostic seam (§1 scope:
//!   the actual HTTP/SOAP/whatever client is outside this repo).
//! - [`credential`]: `CredentialProvider` and the redacted `OpaqueToken`.
//! - [`gateway`]: `CrmGateway`, envelope construction, response
//!   normalization, and the abstract operation surface from §6.
//! - [`dedupe`]: the dedupe guard (§4.B) — at-most-one execution per
//!   payload hash within a window.
//! - [`circuit_breaker`]: per-key circuit breaker table (§4.C, §5).
//! - [`retry`]: `executeWithRetry`, error classification, exponential
//!   backoff (§4.C).
//! - [`effect_runner`]: `EffectRunner`, the single place dedupe, retry, and
//!   the circuit breaker compose around a gateway call (§4.D). Domain
//!   subgraphs call this, never `CrmGateway` directly.

pub mod circuit_breaker;
pub mod credential;
pub mod dedupe;
pub mod effect_runner;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod transport;

pub use circuit_breaker::{CircuitBreakerState, CircuitBreakerTable, CircuitRejection, CircuitState};
pub use credential::{CredentialProvider, OpaqueToken, StaticCredentialProvider};
pub use dedupe::{with_dedupe, DedupeOutcome, InMemorySeenStore, SeenStore, DEFAULT_WRITE_WINDOW};
pub use effect_runner::EffectRunner;
pub use error::{GatewayError, Result, TransportError};
pub use gateway::{AppointmentFilter, AppointmentSpec, CrmGateway, TaskFilter, TaskSpec, WorkflowStepSpec, CALL_TIMEOUT};
pub use retry::{execute_with_retry, classify_error, is_retryable, EnhancedError, ErrorClassification, RetryFailure, RetryOptions};
pub use transport::CrmTransport;

#[cfg(any(test, feature = "test-util"))]
pub use transport::RecordingTransport;
