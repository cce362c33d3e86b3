//! The pluggable wire client.
//!
//! §1 scopes "the remote CRM wire format beyond the abstract operations" out
//! of the core, the same way it scopes out OAuth exchange and the chat
//! transport: this crate owns envelope-building and response normalization,
//! but the actual bytes-on-the-wire client (a `reqwest`-backed HTTP client in
//! production, a recorded-fixture double in tests) is handed in through this
//! trait, exactly as `CredentialProvider` hands in token exchange.

use crate::error::TransportError;
use async_trait::async_trait;

#[async_trait]
pub trait CrmTransport: Send + Sync {
    /// POST `payload` (already carrying `OrganizationId` and the credential)
    /// to `endpoint` and return the raw, un-normalized JSON body.
    async fn send(&self, endpoint: &str, payload: serde_json::Value) -> Result<serde_json::Value, TransportError>;
}

/// An in-memory transport double for tests: records every call it receives
/// and returns canned responses in order, falling back to a default.
#[cfg(any(test, feature = "test-util"))]
pub struct RecordingTransport {
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<serde_json::Value, TransportError>>>,
    pub calls: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: Result<serde_json::Value, TransportError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl CrmTransport for RecordingTransport {
    async fn send(&self, endpoint: &str, payload: serde_json::Value) -> Result<serde_json::Value, TransportError> {
        self.calls.lock().unwrap().push((endpoint.to_string(), payload));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(serde_json::json!({"Valid": true})))
    }
}
