//! Call-session orchestration
//!
//! The orchestrator is the single writer for all call and invite state. It
//! reconciles three independent asynchronous event sources into one
//! consistent view:
//!
//! - call-control commands from the native call surface (start, answer, end),
//! - lifecycle events from the voice transport provider,
//! - push-delivered invitations, cancellations, and binding-token updates.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌─────────────────────────┐
//! │ Native call surface      │─cmd─▶│                         │
//! │ (TelephonyIntegration)   │◀─rep─│                         │
//! └──────────────────────────┘      │    CallOrchestrator     │
//! ┌──────────────────────────┐      │  ┌───────────────────┐  │
//! │ Voice transport          │◀─op──│  │ active-call slot  │  │
//! │ (VoiceTransportProvider) │─evt─▶│  │ invite table      │  │
//! └──────────────────────────┘      │  └───────────────────┘  │
//! ┌──────────────────────────┐      │                         │
//! │ Push channel (decoded)   │─evt─▶│                         │
//! └──────────────────────────┘      └─────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! The active-call slot and the invite table live behind one async mutex.
//! Every handler locks, mutates, releases, and only then performs transport
//! or report side effects; the lock is never held across a network round
//! trip. Transport events arrive per session through that session's own
//! channel and are applied in order by a pump task.

mod builder;
mod calls;
mod events;

pub use builder::CallOrchestratorBuilder;
pub use calls::PendingCall;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::auth::AuthTokenProvider;
use crate::call::{CallDirection, CallId, CallInfo, CallState, CallStats, EndReason};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, ClientEventHandler};
use crate::invite::InviteTable;
use crate::registration::PushRegistrationManager;
use crate::telephony::TelephonyIntegration;
use crate::transport::{TransportHandle, VoiceTransportProvider};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The single active call attempt
pub(crate) struct ActiveCall {
    pub(crate) call_id: CallId,
    pub(crate) state: CallState,
    pub(crate) direction: CallDirection,
    pub(crate) remote_handle: String,
    /// Set once the transport accepts the session request
    pub(crate) transport: Option<TransportHandle>,
    /// Deferred-acknowledgment bridge; consumed on first Connected/Failed
    pub(crate) completion: Option<tokio::sync::oneshot::Sender<ClientResult<()>>>,
}

/// State owned exclusively by the orchestrator, behind one mutex
pub(crate) struct OrchestratorState {
    /// The single call slot; None means idle
    pub(crate) active: Option<ActiveCall>,
    /// Pending inbound invitations, two-key indexed
    pub(crate) invites: InviteTable,
}

/// The call-session orchestration state machine
///
/// Constructed once per process via [`CallOrchestratorBuilder`] with injected
/// capability implementations. All public operations are safe to invoke
/// concurrently from different event sources.
pub struct CallOrchestrator {
    pub(crate) config: ClientConfig,
    pub(crate) auth: Arc<dyn AuthTokenProvider>,
    pub(crate) transport: Arc<dyn VoiceTransportProvider>,
    pub(crate) telephony: Arc<dyn TelephonyIntegration>,
    pub(crate) registration: PushRegistrationManager,
    pub(crate) state: Mutex<OrchestratorState>,
    /// Per-call bookkeeping, kept after retirement for history queries
    pub(crate) call_history: DashMap<CallId, CallInfo>,
    pub(crate) stats: Mutex<CallStats>,
    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    pub(crate) handler: RwLock<Option<Arc<dyn ClientEventHandler>>>,
}

impl CallOrchestrator {
    /// Load persisted state (the push binding); call once at startup
    pub async fn start(&self) -> ClientResult<()> {
        self.registration.restore().await
    }

    /// Best-effort shutdown: end the active call and drop pending invites
    pub async fn stop(&self) -> ClientResult<()> {
        self.end_active_call().await?;
        let dropped = self.state.lock().await.invites.clear();
        for invite in dropped {
            if let Err(e) = self
                .telephony
                .report_ended(invite.call_id, EndReason::Rejected)
                .await
            {
                tracing::warn!(call_id = %invite.call_id, error = %e, "Ended report failed");
            }
        }
        Ok(())
    }

    /// Subscribe to orchestrator events
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Install a push-style event handler
    pub async fn set_event_handler(&self, handler: Arc<dyn ClientEventHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// Access the push-registration manager
    pub fn registration(&self) -> &PushRegistrationManager {
        &self.registration
    }

    /// Info for the currently active call, if any
    pub async fn active_call(&self) -> Option<CallInfo> {
        let state = self.state.lock().await;
        let call_id = state.active.as_ref()?.call_id;
        drop(state);
        self.call_history.get(&call_id).map(|e| e.value().clone())
    }

    /// Info for a current or past call
    pub async fn call_info(&self, call_id: &CallId) -> ClientResult<CallInfo> {
        self.call_history
            .get(call_id)
            .map(|e| e.value().clone())
            .ok_or(ClientError::NoSuchCall { call_id: *call_id })
    }

    /// Number of invites awaiting a decision
    pub async fn pending_invite_count(&self) -> usize {
        self.state.lock().await.invites.len()
    }

    /// Aggregate call statistics
    pub async fn call_stats(&self) -> CallStats {
        self.stats.lock().await.clone()
    }

    /// Record a freshly created call in the history map
    pub(crate) fn record_call(&self, call: &ActiveCall) {
        self.call_history.insert(
            call.call_id,
            CallInfo {
                call_id: call.call_id,
                state: call.state,
                direction: call.direction,
                remote_handle: call.remote_handle.clone(),
                created_at: Utc::now(),
                connected_at: None,
                ended_at: None,
                end_reason: None,
            },
        );
    }

    /// Broadcast an event and dispatch it to the installed handler
    pub(crate) async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event.clone());
        let handler = self.handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_client_event(event).await;
        }
    }
}

impl std::fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("identity", &self.config.identity)
            .finish_non_exhaustive()
    }
}
