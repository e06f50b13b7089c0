//! Native call UI seam
//!
//! The device's call surface issues commands *into* the core by calling the
//! orchestrator's methods; this trait is the outbound half, through which the
//! core reports call status back to that surface.
//!
//! Reports come in two phases per the deferred-acknowledgment protocol: a
//! provisional report is issued while the command is still being acknowledged
//! (`report_outgoing(_, Connecting)` or `report_incoming`), and the final
//! report follows when the transport operation truly completes. Collapsing
//! the two into one synchronous report makes the native UI time out or show a
//! stuck call.

use async_trait::async_trait;

use crate::call::{CallId, EndReason};
use crate::error::ClientResult;

/// Phase of an outgoing call report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingPhase {
    /// Call setup started; provisional
    Connecting,
    /// Call is connected; final
    Connected,
}

/// Reports call status to the device's native call surface
#[async_trait]
pub trait TelephonyIntegration: Send + Sync {
    /// Report an outgoing call's progress
    async fn report_outgoing(&self, call_id: CallId, phase: OutgoingPhase) -> ClientResult<()>;

    /// Present an incoming call; an error means the UI refused it
    async fn report_incoming(&self, call_id: CallId, caller_handle: &str) -> ClientResult<()>;

    /// Report that a call or a presented invite ended
    async fn report_ended(&self, call_id: CallId, reason: EndReason) -> ClientResult<()>;
}
