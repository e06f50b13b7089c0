//! Authorization token provider seam
//!
//! The core never stores credentials. Whenever it needs to open a transport
//! session or touch the push-binding endpoint it asks the injected provider
//! for a short-lived, identity-scoped token.

use async_trait::async_trait;

use crate::error::ClientResult;

/// Short-lived, identity-scoped authorization token
///
/// Opaque to the core; Debug output is redacted so tokens never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the transport provider
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Supplies authorization tokens for transport and registration operations
///
/// # Errors
///
/// * `ClientError::Unauthenticated` - no valid credential is available;
///   surfaced to the authentication layer, never handled inside the core
/// * `ClientError::NetworkError` - the token endpoint was unreachable
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Fetch a token scoped to the given identity
    async fn scoped_token(&self, identity: &str) -> ClientResult<AccessToken>;
}
