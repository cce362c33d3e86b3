//! Error taxonomy for gateway calls, retries, and the circuit breaker.

use thiserror::Error;

/// What the gateway itself can fail with (§4.A, §7). The gateway never
/// retries on its own — `execute_with_retry` is the only thing that inspects
/// these to decide whether to try again.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// A network-layer failure below the HTTP response, e.g. a POSIX error
    /// code surfaced by the transport (`ECONNRESET`, `ETIMEDOUT`, ...).
    #[error("network error: {code}")]
    Network { code: String },

    /// The call did not complete within the gateway's 10s timeout.
    #[error("gateway call timed out")]
    Timeout,

    /// The transport completed and returned an HTTP-shaped failure.
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// The CRM responded with `Valid: false`.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The credential provider could not produce a token.
    #[error("credential error: {0}")]
    Credential(String),

    /// The circuit for this operation's key is open or its half-open
    /// attempt budget is exhausted (§7: "CircuitOpen").
    #[error("circuit breaker open, retry after the reset timeout")]
    CircuitOpen,

    /// Retries exhausted against a retryable error (§7: "Transient{attempts}").
    #[error("transient failure after {attempts} attempt(s)")]
    Transient { attempts: u32 },
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GatewayError::Network { code } => code,
            GatewayError::Timeout => "timeout",
            GatewayError::Http { message, .. } => message,
            GatewayError::InvalidResponse { message } => message,
            GatewayError::Credential(message) => message,
            GatewayError::CircuitOpen => "circuit breaker open",
            GatewayError::Transient { .. } => "transient failure, retries exhausted",
        }
    }
}

/// A transport-level failure, the shape the pluggable wire client (reqwest,
/// tonic, or a test double) reports. The gateway maps this into
/// `GatewayError` at the envelope boundary; nothing above the transport
/// trait needs to know which concrete client produced it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {code}")]
    Network { code: String },
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network { code } => GatewayError::Network { code },
            TransportError::Http { status, message } => GatewayError::Http { status, message },
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
