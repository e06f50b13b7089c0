//! Event types emitted by the orchestrator
//!
//! Applications observe the orchestrator either through the broadcast channel
//! returned by [`subscribe_events`](crate::orchestrator::CallOrchestrator::subscribe_events)
//! or by installing a [`ClientEventHandler`]. Events describe what happened;
//! commands back into the core go through the orchestrator's own methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::call::{CallId, CallState, EndReason};
use crate::error::ClientError;
use crate::registration::BindingStatus;

/// Information about an incoming call invitation
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    /// Call identifier (assigned by the remote party)
    pub call_id: CallId,
    /// Caller handle (number or identity)
    pub caller_handle: String,
    /// Whether the caller identity was verified
    pub verified: bool,
    /// When the invite was received
    pub received_at: DateTime<Utc>,
}

/// Information about a call state change
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    /// Call that changed state
    pub call_id: CallId,
    /// New call state
    pub new_state: CallState,
    /// Previous call state (if known)
    pub previous_state: Option<CallState>,
    /// Reason for the state change (if available)
    pub reason: Option<String>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about a push-binding status change
#[derive(Debug, Clone)]
pub struct BindingStatusInfo {
    /// New binding status
    pub status: BindingStatus,
    /// Status change reason
    pub reason: Option<String>,
    /// When the status changed
    pub timestamp: DateTime<Utc>,
}

/// Event priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine status (quality warnings, binding refreshes)
    Low,
    /// State changes
    Normal,
    /// Incoming calls, errors
    High,
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// An inbound invite was received (whether or not it was presented)
    IncomingCall {
        info: IncomingCallInfo,
        priority: EventPriority,
    },
    /// A call changed state
    CallStateChanged {
        info: CallStatusInfo,
        priority: EventPriority,
    },
    /// A call was retired
    CallEnded {
        call_id: CallId,
        reason: EndReason,
        priority: EventPriority,
    },
    /// Transport reported degraded call quality
    QualityWarning {
        call_id: CallId,
        warnings: Vec<crate::transport::QualityWarning>,
        priority: EventPriority,
    },
    /// Push-binding status changed
    BindingStatusChanged {
        info: BindingStatusInfo,
        priority: EventPriority,
    },
    /// An error occurred that was not surfaced through a Result
    ClientError {
        error: ClientError,
        call_id: Option<CallId>,
        priority: EventPriority,
    },
}

impl ClientEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::IncomingCall { priority, .. } => *priority,
            ClientEvent::CallStateChanged { priority, .. } => *priority,
            ClientEvent::CallEnded { priority, .. } => *priority,
            ClientEvent::QualityWarning { priority, .. } => *priority,
            ClientEvent::BindingStatusChanged { priority, .. } => *priority,
            ClientEvent::ClientError { priority, .. } => *priority,
        }
    }

    /// Get the call id associated with this event (if any)
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            ClientEvent::IncomingCall { info, .. } => Some(info.call_id),
            ClientEvent::CallStateChanged { info, .. } => Some(info.call_id),
            ClientEvent::CallEnded { call_id, .. } => Some(*call_id),
            ClientEvent::QualityWarning { call_id, .. } => Some(*call_id),
            ClientEvent::BindingStatusChanged { .. } => None,
            ClientEvent::ClientError { call_id, .. } => *call_id,
        }
    }
}

/// Handler trait for push-style event consumption
///
/// All methods have default no-op implementations; override what you need.
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// An inbound invite was received
    async fn on_incoming_call(&self, _info: IncomingCallInfo) {}

    /// A call changed state
    async fn on_call_state_changed(&self, _info: CallStatusInfo) {}

    /// A call was retired
    async fn on_call_ended(&self, _call_id: CallId, _reason: EndReason) {}

    /// Push-binding status changed
    async fn on_binding_status_changed(&self, _info: BindingStatusInfo) {}

    /// An error occurred outside a command's Result path
    async fn on_client_error(&self, _error: ClientError, _call_id: Option<CallId>) {}

    /// Dispatch a client event to the specific methods above
    async fn on_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::IncomingCall { info, .. } => {
                self.on_incoming_call(info).await;
            }
            ClientEvent::CallStateChanged { info, .. } => {
                self.on_call_state_changed(info).await;
            }
            ClientEvent::CallEnded { call_id, reason, .. } => {
                self.on_call_ended(call_id, reason).await;
            }
            ClientEvent::QualityWarning { .. } => {
                // Observability only; surfaced via the broadcast channel
            }
            ClientEvent::BindingStatusChanged { info, .. } => {
                self.on_binding_status_changed(info).await;
            }
            ClientEvent::ClientError { error, call_id, .. } => {
                self.on_client_error(error, call_id).await;
            }
        }
    }
}
