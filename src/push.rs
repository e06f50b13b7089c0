//! Typed push-channel events
//!
//! The platform push layer decodes opaque payloads into these events before
//! they reach the core; [`PushEvent::from_payload`] handles the tagged JSON
//! shape the delivery service produces. The orchestrator consumes every push
//! event through one funnel
//! ([`handle_push_event`](crate::orchestrator::CallOrchestrator::handle_push_event)),
//! keeping the single-writer guarantee.

use serde::{Deserialize, Serialize};

use crate::call::CallId;
use crate::error::{ClientError, ClientResult};
use crate::invite::CallLegId;

/// Opaque device token identifying this device to the push service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceToken(pub String);

impl DeviceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why an invite was cancelled by the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller hung up before the invite was answered
    CallerHangup,
    /// The callee is busy elsewhere
    Busy,
    /// The invite was answered on another device
    AnsweredElsewhere,
    /// Provider-specific reason
    Other(String),
}

/// Decoded push-channel events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// The push service issued (or rotated) the device token
    BindingTokenUpdated { token: DeviceToken },
    /// The push service declared the stored token invalid
    BindingTokenInvalidated,
    /// An inbound call invitation
    Invite {
        call_id: CallId,
        call_leg_id: CallLegId,
        caller_handle: String,
        verified: bool,
    },
    /// A previously delivered invite was cancelled; carries only the leg id
    InviteCancelled {
        call_leg_id: CallLegId,
        reason: CancelReason,
    },
}

/// Wire shape of a push payload, tagged by event kind
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PushPayload {
    TokenUpdated {
        token: String,
    },
    TokenInvalidated,
    Invite {
        call_id: CallId,
        call_leg_id: String,
        caller: String,
        #[serde(default)]
        verified: bool,
    },
    Cancel {
        call_leg_id: String,
        #[serde(default)]
        reason: Option<CancelReason>,
    },
}

impl PushEvent {
    /// Decode a raw push payload into a typed event
    pub fn from_payload(payload: &[u8]) -> ClientResult<Self> {
        let payload: PushPayload =
            serde_json::from_slice(payload).map_err(|e| ClientError::PushDecodeError {
                reason: e.to_string(),
            })?;
        Ok(match payload {
            PushPayload::TokenUpdated { token } => PushEvent::BindingTokenUpdated {
                token: DeviceToken::new(token),
            },
            PushPayload::TokenInvalidated => PushEvent::BindingTokenInvalidated,
            PushPayload::Invite {
                call_id,
                call_leg_id,
                caller,
                verified,
            } => PushEvent::Invite {
                call_id,
                call_leg_id: CallLegId::new(call_leg_id),
                caller_handle: caller,
                verified,
            },
            PushPayload::Cancel { call_leg_id, reason } => PushEvent::InviteCancelled {
                call_leg_id: CallLegId::new(call_leg_id),
                reason: reason.unwrap_or(CancelReason::CallerHangup),
            },
        })
    }
}
