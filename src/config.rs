//! Configuration for the client core

use std::time::Duration;

/// Default invite timeout: an unanswered invite is discarded after this long
pub const DEFAULT_INVITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default push-binding time-to-live (~182 days, half a year)
pub const DEFAULT_BINDING_TTL: Duration = Duration::from_secs(182 * 24 * 60 * 60);

/// Configuration for the orchestrator and registration manager
///
/// ```rust
/// use std::time::Duration;
/// use dialtone_client_core::ClientConfig;
///
/// let config = ClientConfig::new("alice@example.com")
///     .with_invite_timeout(Duration::from_secs(45))
///     .with_user_agent("Dialtone/1.0");
///
/// assert_eq!(config.identity, "alice@example.com");
/// assert_eq!(config.invite_timeout, Duration::from_secs(45));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity the auth provider scopes tokens to
    pub identity: String,
    /// How long an unanswered invite is kept before being discarded
    pub invite_timeout: Duration,
    /// How long a successful push binding remains valid
    pub binding_ttl: Duration,
    /// User agent string reported to the transport provider
    pub user_agent: Option<String>,
}

impl ClientConfig {
    /// Create a configuration with default timings
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            invite_timeout: DEFAULT_INVITE_TIMEOUT,
            binding_ttl: DEFAULT_BINDING_TTL,
            user_agent: None,
        }
    }

    /// Set the invite timeout
    pub fn with_invite_timeout(mut self, timeout: Duration) -> Self {
        self.invite_timeout = timeout;
        self
    }

    /// Set the push-binding time-to-live
    pub fn with_binding_ttl(mut self, ttl: Duration) -> Self {
        self.binding_ttl = ttl;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
