//! Call-control commands for the orchestrator
//!
//! This module contains the command surface the native call surface drives:
//! starting an outbound call, answering or rejecting an invite, and ending
//! the active call.
//!
//! # Deferred acknowledgment
//!
//! Every command returns as soon as the state change and the provisional
//! outward report are done; the transport operation runs in a spawned task.
//! Commands that set up a call return a [`PendingCall`] whose completion
//! channel resolves once, when the transport first reports Connected or
//! Failed. The native surface fulfils its action immediately on the command's
//! return and finishes the presentation when the completion resolves.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::call::{CallDirection, CallId, CallState, EndReason};
use crate::error::{ClientError, ClientResult};
use crate::events::EventPriority;
use crate::telephony::OutgoingPhase;

use super::{ActiveCall, CallOrchestrator};

/// A call whose setup was acknowledged but has not yet completed
///
/// The completion channel resolves exactly once: `Ok(())` on the first
/// Connected event, `Err` on failure or termination before connect. Dropping
/// the receiver is allowed; the call proceeds regardless.
#[derive(Debug)]
pub struct PendingCall {
    /// Identifier of the newly created call
    pub call_id: CallId,
    /// Resolves when call setup truly completes
    pub completion: oneshot::Receiver<ClientResult<()>>,
}

/// Maximum accepted length for a remote handle
const MAX_HANDLE_LEN: usize = 128;

/// Validate a dialable remote handle (number or user identity)
///
/// Returns the trimmed handle; that is what gets stored and dialed.
fn validate_remote_handle(handle: &str) -> ClientResult<&str> {
    let trimmed = handle.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid_handle(handle, "empty handle"));
    }
    if trimmed.len() > MAX_HANDLE_LEN {
        return Err(ClientError::invalid_handle(handle, "handle too long"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ClientError::invalid_handle(handle, "control characters"));
    }
    Ok(trimmed)
}

impl CallOrchestrator {
    /// Start an outbound call to the given remote handle
    ///
    /// Creates the call in `Requesting`, immediately reports
    /// "outgoing, connecting" to the native surface, then asynchronously
    /// fetches an access token and opens the transport session.
    ///
    /// # Errors
    ///
    /// * `ClientError::InvalidHandle` - the handle is not dialable
    /// * `ClientError::AlreadyInCall` - the single call slot is occupied
    pub async fn request_outbound_call(
        self: &Arc<Self>,
        remote_handle: impl Into<String>,
    ) -> ClientResult<PendingCall> {
        let remote_handle = remote_handle.into();
        let remote_handle = validate_remote_handle(&remote_handle)?.to_string();

        let (completion_tx, completion_rx) = oneshot::channel();
        let call_id = CallId::new_v4();

        {
            let mut state = self.state.lock().await;
            if let Some(active) = &state.active {
                return Err(ClientError::AlreadyInCall {
                    active_call_id: active.call_id,
                });
            }
            let call = ActiveCall {
                call_id,
                state: CallState::Requesting,
                direction: CallDirection::Outbound,
                remote_handle: remote_handle.clone(),
                transport: None,
                completion: Some(completion_tx),
            };
            self.record_call(&call);
            state.active = Some(call);
        }
        self.stats.lock().await.total_calls += 1;

        // Provisional report: first phase of the deferred acknowledgment
        if let Err(e) = self
            .telephony
            .report_outgoing(call_id, OutgoingPhase::Connecting)
            .await
        {
            warn!(call_id = %call_id, error = %e, "Provisional outgoing report failed");
        }
        self.emit_state_change(call_id, CallState::Requesting, None, None)
            .await;

        info!(call_id = %call_id, remote = %remote_handle, "Created outbound call");

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.open_transport(call_id, remote_handle).await;
        });

        Ok(PendingCall {
            call_id,
            completion: completion_rx,
        })
    }

    /// Answer a pending invite, promoting it to the active call
    ///
    /// The invite is removed from the table, its timeout cancelled, and the
    /// call enters `Connecting` while the transport leg is accepted
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// * `ClientError::AlreadyInCall` - the single call slot is occupied
    /// * `ClientError::NoSuchInvite` - the invite was already answered,
    ///   cancelled, or timed out (an expected race, safe to ignore)
    pub async fn answer_invite(self: &Arc<Self>, call_id: CallId) -> ClientResult<PendingCall> {
        let (completion_tx, completion_rx) = oneshot::channel();

        let invite = {
            let mut state = self.state.lock().await;
            if let Some(active) = &state.active {
                return Err(ClientError::AlreadyInCall {
                    active_call_id: active.call_id,
                });
            }
            let invite = state
                .invites
                .remove_by_id(&call_id)
                .ok_or(ClientError::NoSuchInvite { call_id })?;

            let call = ActiveCall {
                call_id,
                state: CallState::Connecting,
                direction: CallDirection::Inbound,
                remote_handle: invite.caller_handle.clone(),
                transport: None,
                completion: Some(completion_tx),
            };
            self.record_call(&call);
            state.active = Some(call);
            invite
        };
        self.stats.lock().await.total_calls += 1;

        self.emit_state_change(call_id, CallState::Connecting, None, None)
            .await;
        info!(call_id = %call_id, caller = %invite.caller_handle, "Answering invite");

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.accept_transport(call_id, invite).await;
        });

        Ok(PendingCall {
            call_id,
            completion: completion_rx,
        })
    }

    /// Reject a pending invite
    ///
    /// Removes the invite (cancelling its timeout) and dismisses any
    /// presented incoming-call UI.
    ///
    /// # Errors
    ///
    /// * `ClientError::NoSuchInvite` - already answered, cancelled, or
    ///   timed out (an expected race, safe to ignore)
    pub async fn reject_invite(&self, call_id: CallId) -> ClientResult<()> {
        let invite = {
            let mut state = self.state.lock().await;
            state
                .invites
                .remove_by_id(&call_id)
                .ok_or(ClientError::NoSuchInvite { call_id })?
        };

        info!(call_id = %call_id, caller = %invite.caller_handle, "Rejected invite");
        if let Err(e) = self.telephony.report_ended(call_id, EndReason::Rejected).await {
            warn!(call_id = %call_id, error = %e, "Ended report failed");
        }
        self.emit(crate::events::ClientEvent::CallEnded {
            call_id,
            reason: EndReason::Rejected,
            priority: EventPriority::Normal,
        })
        .await;
        Ok(())
    }

    /// End the active call
    ///
    /// Transitions to `Disconnecting` and asks the transport to disconnect.
    /// A no-op (logged) when there is no active call or a disconnect is
    /// already in progress: end commands race with natural call termination,
    /// so this must be idempotent rather than an error.
    pub async fn end_active_call(&self) -> ClientResult<()> {
        let mut state = self.state.lock().await;

        let Some(call) = state.active.as_ref() else {
            info!("End requested with no active call; ignoring");
            return Ok(());
        };
        let call_id = call.call_id;

        if call.state == CallState::Disconnecting {
            info!(call_id = %call_id, "End requested while already disconnecting; ignoring");
            return Ok(());
        }

        match call.transport.clone() {
            Some(handle) => {
                let previous = call.state;
                if let Some(call) = state.active.as_mut() {
                    call.state = CallState::Disconnecting;
                }
                drop(state);

                if let Some(mut info) = self.call_history.get_mut(&call_id) {
                    info.state = CallState::Disconnecting;
                }
                self.emit_state_change(call_id, CallState::Disconnecting, Some(previous), None)
                    .await;
                info!(call_id = %call_id, "Disconnecting call");

                if let Err(e) = self.transport.disconnect(&handle).await {
                    // The transport could not confirm; retire locally so the
                    // slot is not wedged.
                    warn!(call_id = %call_id, error = %e, "Disconnect failed; retiring call locally");
                    self.force_retire(call_id, EndReason::Normal, Some(e.to_string()))
                        .await;
                }
                Ok(())
            }
            None => {
                // The transport never accepted the request; nothing to
                // disconnect, retire immediately.
                let completion = state.active.take().and_then(|mut c| c.completion.take());
                drop(state);

                if let Some(tx) = completion {
                    let _ = tx.send(Err(ClientError::transport_failure(
                        "call ended before transport setup completed",
                    )));
                }
                info!(call_id = %call_id, "Ended call before transport setup");
                self.retire_call(call_id, CallState::Ended, EndReason::Normal, None)
                    .await;
                Ok(())
            }
        }
    }

    /// Record the connected timestamp for a call
    pub(crate) fn mark_connected(&self, call_id: CallId) {
        if let Some(mut info) = self.call_history.get_mut(&call_id) {
            info.state = CallState::Connected;
            if info.connected_at.is_none() {
                info.connected_at = Some(Utc::now());
            }
        }
    }
}
