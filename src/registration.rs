//! Push-channel binding management
//!
//! This module owns the device/push-channel binding lifecycle: register the
//! device token with the transport provider's registration endpoint,
//! re-register before the binding's time-to-live elapses (or when the token
//! rotates), and unregister-then-forget when the push service invalidates the
//! token.
//!
//! # Key Components
//!
//! - **DeviceBinding** - The persisted registration state (token + bound-at)
//! - **needs_registration** - Pure TTL/token-change check
//! - **BindingStore** - Persistence seam; the binding must survive restarts
//! - **PushRegistrationManager** - Serialized binding operations
//!
//! The manager holds its mutex across the register/unregister round trip.
//! That is deliberate: a concurrent token-update and token-invalidate pair
//! must not interleave, and a second update must not double-register while
//! the first is still in flight. The binding lock never contends with call
//! handling.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::auth::AuthTokenProvider;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{BindingStatusInfo, ClientEvent, EventPriority};
use crate::push::DeviceToken;
use crate::transport::VoiceTransportProvider;

/// The push-channel registration state
///
/// Created or refreshed on every successful registration; cleared when the
/// push service reports the token invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    /// Device token the binding was registered with
    pub token: DeviceToken,
    /// When the registration last succeeded
    pub bound_at: DateTime<Utc>,
}

/// Current status of the push binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingStatus {
    /// No binding exists
    Unbound,
    /// A binding exists and is within its TTL
    Bound,
    /// A binding exists but its TTL has elapsed
    Expired,
    /// The last registration attempt failed; prior binding (if any) kept
    Failed,
}

impl std::fmt::Display for BindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingStatus::Unbound => write!(f, "Unbound"),
            BindingStatus::Bound => write!(f, "Bound"),
            BindingStatus::Expired => write!(f, "Expired"),
            BindingStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Decide whether a (re-)registration is required
///
/// True when there is no binding, the token changed, or the binding's age has
/// reached the TTL. Pure function of its inputs.
pub fn needs_registration(
    now: DateTime<Utc>,
    binding: Option<&DeviceBinding>,
    token: &DeviceToken,
    ttl: std::time::Duration,
) -> bool {
    let Some(binding) = binding else {
        return true;
    };
    if binding.token != *token {
        return true;
    }
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::max_value());
    now - binding.bound_at >= ttl
}

/// Persistence seam for the device binding
///
/// Calls and invites are in-memory only, but the binding must survive process
/// restarts, otherwise every launch would re-register needlessly.
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn load(&self) -> ClientResult<Option<DeviceBinding>>;
    async fn save(&self, binding: &DeviceBinding) -> ClientResult<()>;
    async fn clear(&self) -> ClientResult<()>;
}

/// In-memory store, for tests and ephemeral configurations
#[derive(Default)]
pub struct MemoryBindingStore {
    binding: Mutex<Option<DeviceBinding>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn load(&self) -> ClientResult<Option<DeviceBinding>> {
        Ok(self.binding.lock().await.clone())
    }

    async fn save(&self, binding: &DeviceBinding) -> ClientResult<()> {
        *self.binding.lock().await = Some(binding.clone());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        *self.binding.lock().await = None;
        Ok(())
    }
}

/// JSON file store backed by tokio::fs
pub struct JsonFileBindingStore {
    path: PathBuf,
}

impl JsonFileBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BindingStore for JsonFileBindingStore {
    async fn load(&self) -> ClientResult<Option<DeviceBinding>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let binding = serde_json::from_slice(&bytes)
                    .map_err(|e| ClientError::storage_error(e.to_string()))?;
                Ok(Some(binding))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::storage_error(e.to_string())),
        }
    }

    async fn save(&self, binding: &DeviceBinding) -> ClientResult<()> {
        let bytes = serde_json::to_vec(binding)
            .map_err(|e| ClientError::storage_error(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| ClientError::storage_error(e.to_string()))
    }

    async fn clear(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::storage_error(e.to_string())),
        }
    }
}

/// Owns the device/push-channel binding lifecycle
pub struct PushRegistrationManager {
    identity: String,
    binding_ttl: std::time::Duration,
    auth: Arc<dyn AuthTokenProvider>,
    transport: Arc<dyn VoiceTransportProvider>,
    store: Arc<dyn BindingStore>,
    /// Serialization point; held across register/unregister round trips
    binding: Mutex<Option<DeviceBinding>>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl PushRegistrationManager {
    pub fn new(
        config: &ClientConfig,
        auth: Arc<dyn AuthTokenProvider>,
        transport: Arc<dyn VoiceTransportProvider>,
        store: Arc<dyn BindingStore>,
        event_tx: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            identity: config.identity.clone(),
            binding_ttl: config.binding_ttl,
            auth,
            transport,
            store,
            binding: Mutex::new(None),
            event_tx,
        }
    }

    /// Load any persisted binding into memory; call once at startup
    pub async fn restore(&self) -> ClientResult<()> {
        let restored = self.store.load().await?;
        if let Some(ref binding) = restored {
            debug!(bound_at = %binding.bound_at, "Restored persisted push binding");
        }
        *self.binding.lock().await = restored;
        Ok(())
    }

    /// Handle a token update from the push service
    ///
    /// No-op if the token is unchanged and the binding is within TTL.
    /// On registration failure the prior binding is left untouched; the next
    /// token-update event retries naturally (no retry timer).
    pub async fn on_token_updated(&self, token: DeviceToken) -> ClientResult<()> {
        let mut binding = self.binding.lock().await;

        if !needs_registration(Utc::now(), binding.as_ref(), &token, self.binding_ttl) {
            debug!("Push binding still valid; skipping registration");
            return Ok(());
        }

        let auth_token = self.auth.scoped_token(&self.identity).await?;
        match self.transport.register(auth_token, &token).await {
            Ok(()) => {
                let new_binding = DeviceBinding {
                    token,
                    bound_at: Utc::now(),
                };
                if let Err(e) = self.store.save(&new_binding).await {
                    // The server-side binding is in place; persistence catches
                    // up on the next successful registration.
                    warn!(error = %e, "Failed to persist push binding");
                }
                *binding = Some(new_binding);
                info!("Push binding registered");
                self.emit_status(BindingStatus::Bound, None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Push binding registration failed; keeping prior binding");
                self.emit_status(BindingStatus::Failed, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Handle a token invalidation from the push service
    ///
    /// Unregisters best-effort, then clears the binding unconditionally so a
    /// future token update re-registers.
    pub async fn on_token_invalidated(&self) -> ClientResult<()> {
        let mut binding = self.binding.lock().await;

        let Some(old) = binding.take() else {
            debug!("Token invalidated with no binding; nothing to do");
            return Ok(());
        };

        match self.auth.scoped_token(&self.identity).await {
            Ok(auth_token) => {
                if let Err(e) = self.transport.unregister(auth_token, &old.token).await {
                    warn!(error = %e, "Push unregister failed; binding cleared anyway");
                }
            }
            Err(e) => {
                warn!(error = %e, "No auth token for push unregister; binding cleared anyway");
            }
        }

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear persisted push binding");
        }
        info!("Push binding cleared");
        self.emit_status(BindingStatus::Unbound, Some("token invalidated".to_string()));
        Ok(())
    }

    /// Current binding, if any
    pub async fn binding(&self) -> Option<DeviceBinding> {
        self.binding.lock().await.clone()
    }

    /// Current binding status (TTL-aware)
    pub async fn status(&self) -> BindingStatus {
        match self.binding.lock().await.as_ref() {
            Some(binding)
                if !needs_registration(
                    Utc::now(),
                    Some(binding),
                    &binding.token,
                    self.binding_ttl,
                ) =>
            {
                BindingStatus::Bound
            }
            Some(_) => BindingStatus::Expired,
            None => BindingStatus::Unbound,
        }
    }

    fn emit_status(&self, status: BindingStatus, reason: Option<String>) {
        let _ = self.event_tx.send(ClientEvent::BindingStatusChanged {
            info: BindingStatusInfo {
                status,
                reason,
                timestamp: Utc::now(),
            },
            priority: EventPriority::Low,
        });
    }
}
