//! Voice transport provider seam
//!
//! The transport provider opens, accepts, and disconnects call sessions over
//! the network and emits a per-session stream of lifecycle events. The
//! orchestrator consumes those streams one event at a time through its pump
//! tasks, so transport events for a session are applied in the order the
//! provider emits them.
//!
//! The same provider also owns the push-registration endpoint; register and
//! unregister bind and unbind the device token used for inbound invites.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::auth::AccessToken;
use crate::call::CallId;
use crate::error::ClientResult;
use crate::invite::CallInvite;
use crate::push::DeviceToken;

/// Opaque handle to an established transport session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub String);

impl TransportHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }
}

impl std::fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why the transport dropped a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Either side hung up normally
    Hangup,
    /// The remote party was busy
    Busy,
    /// The session was cancelled before it connected
    Cancelled,
    /// Provider-specific reason
    Other(String),
}

/// Call-quality conditions the transport can warn about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityWarning {
    HighJitter,
    HighRtt,
    HighPacketLoss,
    LowMos,
    ConstantAudioInputLevel,
}

/// Lifecycle events for one transport session
///
/// Each session has its own event stream, so events are implicitly tagged
/// with the session they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The remote party is being alerted
    Ringing,
    /// The session is connected end to end
    Connected,
    /// The connection was lost and is being re-established
    Reconnecting { reason: String },
    /// The session ended
    Disconnected { reason: DisconnectReason },
    /// The session could not be established or was lost for good
    Failed { reason: String },
    /// Quality degraded (raised) or recovered (cleared)
    QualityWarning { warnings: Vec<QualityWarning> },
}

/// An accepted transport session: its handle plus its event stream
pub struct TransportSession {
    /// Handle used for later disconnect commands
    pub handle: TransportHandle,
    /// Ordered lifecycle events for this session
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Opens, accepts, and tears down call sessions; binds the push channel
#[async_trait]
pub trait VoiceTransportProvider: Send + Sync {
    /// Open an outbound session to the given remote handle
    async fn open(
        &self,
        token: AccessToken,
        remote_handle: &str,
        call_id: CallId,
    ) -> ClientResult<TransportSession>;

    /// Accept the transport leg behind an inbound invite
    async fn accept(
        &self,
        token: AccessToken,
        invite: &CallInvite,
        call_id: CallId,
    ) -> ClientResult<TransportSession>;

    /// Disconnect an established session
    async fn disconnect(&self, handle: &TransportHandle) -> ClientResult<()>;

    /// Bind the device token so invites are delivered via push
    async fn register(&self, token: AccessToken, device_token: &DeviceToken) -> ClientResult<()>;

    /// Unbind the device token
    async fn unregister(&self, token: AccessToken, device_token: &DeviceToken) -> ClientResult<()>;
}
