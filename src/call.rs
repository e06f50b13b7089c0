//! Call state tracking for the client core
//!
//! This module provides the call identifier, the call state machine, and
//! lightweight per-call bookkeeping. All actual signaling and media work is
//! delegated to the injected voice transport provider.
//!
//! Exactly one call may be in a non-terminal state at a time (the client
//! supports a single concurrent call); the orchestrator enforces this.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Unique identifier for a call
///
/// Assigned by the orchestrator for outbound calls; arrives with the push
/// invite for inbound calls. Never reused.
pub type CallId = Uuid;

/// Current state of a call
///
/// Outbound calls walk `Requesting → Connecting → Ringing → Connected`;
/// inbound calls enter at `Connecting` when an invite is answered. Any state
/// may jump to `Failed` on a transport failure. `Ended` and `Failed` are
/// terminal and retire the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Outbound call requested, transport session not yet accepted
    Requesting,
    /// Transport session accepted, connection in progress
    Connecting,
    /// Remote party is being alerted
    Ringing,
    /// Call is connected and media is flowing
    Connected,
    /// Transport lost the connection and is re-establishing it
    Reconnecting,
    /// Disconnect requested, waiting for the transport to confirm
    Disconnecting,
    /// Call ended normally
    Ended,
    /// Call failed to establish or was lost
    Failed,
}

impl CallState {
    /// Check if the call is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Check if the call is still in progress
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal()
    }

    /// Check if the call is connected (media can flow)
    pub fn is_connected(&self) -> bool {
        matches!(self, CallState::Connected)
    }

    /// Check if call setup is still pending (no Connected or Failed yet)
    ///
    /// While setup is pending the call holds an unfired completion channel.
    pub fn is_setup_pending(&self) -> bool {
        matches!(
            self,
            CallState::Requesting | CallState::Connecting | CallState::Ringing
        )
    }
}

/// Direction of a call (from the client's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Outbound call (client initiated)
    Outbound,
    /// Inbound call (received via push invite)
    Inbound,
}

/// Why a call ended, as reported to the native call UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Call completed or was hung up normally
    Normal,
    /// Transport failed to establish or maintain the call
    Failed,
    /// Invite was rejected, cancelled, or timed out before answer
    Rejected,
}

/// Information about a call, kept in the history map after retirement
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Current state of the call
    pub state: CallState,
    /// Direction of the call
    pub direction: CallDirection,
    /// Remote handle (destination number or caller identity)
    pub remote_handle: String,
    /// When the call was created
    pub created_at: DateTime<Utc>,
    /// When the call was connected (if it connected)
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call ended (if it ended)
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the call ended (if it ended)
    pub end_reason: Option<EndReason>,
}

/// Statistics about calls handled by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    pub total_calls: usize,
    pub connected_calls: usize,
    pub failed_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(CallState::Ended.is_terminal());
        assert!(CallState::Failed.is_terminal());
        assert!(!CallState::Connected.is_terminal());
        assert!(!CallState::Disconnecting.is_terminal());
    }

    #[test]
    fn test_setup_pending() {
        assert!(CallState::Requesting.is_setup_pending());
        assert!(CallState::Connecting.is_setup_pending());
        assert!(CallState::Ringing.is_setup_pending());
        assert!(!CallState::Connected.is_setup_pending());
        assert!(!CallState::Reconnecting.is_setup_pending());
        assert!(!CallState::Failed.is_setup_pending());
    }
}
