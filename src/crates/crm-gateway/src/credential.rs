//! The opaque credential handle the coordinator wires into the gateway.
//!
//! OAuth/session token exchange and refresh is an external collaborator
//! (§1); the core only ever holds a `CredentialProvider` handle and never
//! reads or logs the token it returns (§6).

use async_trait::async_trait;

/// A short-lived token, opaque to everything in this workspace. `Debug`
/// deliberately never prints the contents — logging this string anywhere is
/// a bug, not a feature.
#[derive(Clone)]
pub struct OpaqueToken(String);

impl OpaqueToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The only place the raw token value may be read: building the
    /// envelope the gateway hands to the transport.
    pub(crate) fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OpaqueToken(<redacted>)")
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch a valid credential, refreshing on demand if the provider's
    /// cached one has expired. Failure here surfaces as
    /// `GatewayError::Credential` and is never retried by `C` (auth failures
    /// are not in the retryable set).
    async fn get_credential(&self) -> Result<OpaqueToken, String>;
}

/// A fixed-token provider — useful for tests and for callers who exchange
/// credentials themselves and just need a handle to pass through.
pub struct StaticCredentialProvider(OpaqueToken);

impl StaticCredentialProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(OpaqueToken::new(token))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credential(&self) -> Result<OpaqueToken, String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_token_contents() {
        let token = OpaqueToken::new("super-secret");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("super-secret"));
    }

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticCredentialProvider::new("tok-1");
        let token = provider.get_credential().await.unwrap();
        assert_eq!(token.reveal(), "tok-1");
    }
}
