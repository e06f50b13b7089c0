//! Event application for the orchestrator
//!
//! Everything here runs in response to an asynchronous event: transport
//! lifecycle events pumped from a session's channel, decoded push events, or
//! an invite-timeout firing. Each handler takes the state lock, applies its
//! transition atomically, releases, and then performs outward side effects.
//!
//! Events that reference a retired or unknown call are discarded with a debug
//! log: the transport and the UI race each other, and a late event is an
//! expected condition, not an error.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallId, CallState, EndReason};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventPriority, IncomingCallInfo};
use crate::invite::{CallInvite, CallLegId};
use crate::push::{CancelReason, PushEvent};
use crate::telephony::OutgoingPhase;
use crate::transport::{TransportEvent, TransportSession};

use super::CallOrchestrator;

impl CallOrchestrator {
    // ===== PUSH EVENTS =====

    /// Single funnel for decoded push-channel events
    pub async fn handle_push_event(self: &Arc<Self>, event: PushEvent) -> ClientResult<()> {
        match event {
            PushEvent::BindingTokenUpdated { token } => {
                self.registration.on_token_updated(token).await
            }
            PushEvent::BindingTokenInvalidated => self.registration.on_token_invalidated().await,
            PushEvent::Invite {
                call_id,
                call_leg_id,
                caller_handle,
                verified,
            } => {
                self.handle_incoming_invite(CallInvite {
                    call_id,
                    call_leg_id,
                    caller_handle,
                    received_at: Utc::now(),
                    verified,
                })
                .await;
                Ok(())
            }
            PushEvent::InviteCancelled { call_leg_id, reason } => {
                self.handle_invite_cancelled(&call_leg_id, reason).await;
                Ok(())
            }
        }
    }

    /// Store a push-delivered invite and present it to the native surface
    ///
    /// Duplicate invites (same call id) are ignored. While a call is active
    /// the invite is recorded but not presented; it still honors
    /// cancellation and its timeout.
    pub async fn handle_incoming_invite(self: &Arc<Self>, invite: CallInvite) {
        let call_id = invite.call_id;
        let caller_handle = invite.caller_handle.clone();
        let verified = invite.verified;
        let received_at = invite.received_at;

        let busy = {
            let mut state = self.state.lock().await;
            if state.invites.contains(&call_id) {
                debug!(call_id = %call_id, "Duplicate invite ignored");
                return;
            }
            let busy = state.active.is_some();
            let timeout = self.spawn_invite_timeout(call_id);
            state.invites.insert(invite, Some(timeout));
            busy
        };

        self.emit(ClientEvent::IncomingCall {
            info: IncomingCallInfo {
                call_id,
                caller_handle: caller_handle.clone(),
                verified,
                received_at,
            },
            priority: EventPriority::High,
        })
        .await;

        if busy {
            info!(call_id = %call_id, "Invite received while in a call; recorded but not presented");
            return;
        }

        info!(call_id = %call_id, caller = %caller_handle, "Incoming call");
        if let Err(e) = self.telephony.report_incoming(call_id, &caller_handle).await {
            warn!(call_id = %call_id, error = %e, "Native surface refused incoming call; discarding invite");
            let mut state = self.state.lock().await;
            state.invites.remove_by_id(&call_id);
        }
    }

    /// Apply a push-delivered invite cancellation
    ///
    /// Cancellations carry only the call-leg id; the invite is found through
    /// the table's secondary index. A no-op when nothing matches (the invite
    /// was already answered, rejected, or expired).
    pub async fn handle_invite_cancelled(&self, call_leg_id: &CallLegId, reason: CancelReason) {
        let invite = {
            let mut state = self.state.lock().await;
            state.invites.remove_by_leg(call_leg_id)
        };

        let Some(invite) = invite else {
            debug!(call_leg_id = %call_leg_id, "Cancellation for unknown invite; ignoring");
            return;
        };

        info!(
            call_id = %invite.call_id,
            call_leg_id = %call_leg_id,
            reason = ?reason,
            "Invite cancelled"
        );
        if let Err(e) = self
            .telephony
            .report_ended(invite.call_id, EndReason::Rejected)
            .await
        {
            warn!(call_id = %invite.call_id, error = %e, "Ended report failed");
        }
        self.emit(ClientEvent::CallEnded {
            call_id: invite.call_id,
            reason: EndReason::Rejected,
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Arm the hard timeout for a stored invite
    fn spawn_invite_timeout(self: &Arc<Self>, call_id: CallId) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::downgrade(self);
        let timeout = self.config.invite_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.expire_invite(call_id).await;
            }
        })
    }

    /// Discard an invite whose timeout elapsed
    async fn expire_invite(&self, call_id: CallId) {
        let expired = {
            let mut state = self.state.lock().await;
            state.invites.remove_by_id(&call_id)
        };
        if expired.is_none() {
            return;
        }

        info!(call_id = %call_id, "Invite timed out");
        if let Err(e) = self.telephony.report_ended(call_id, EndReason::Rejected).await {
            warn!(call_id = %call_id, error = %e, "Ended report failed");
        }
        self.emit(ClientEvent::CallEnded {
            call_id,
            reason: EndReason::Rejected,
            priority: EventPriority::Normal,
        })
        .await;
    }

    // ===== TRANSPORT SETUP =====

    /// Open the transport session for a requested outbound call
    pub(crate) async fn open_transport(self: &Arc<Self>, call_id: CallId, remote_handle: String) {
        let result = async {
            let token = self.auth.scoped_token(&self.config.identity).await?;
            self.transport.open(token, &remote_handle, call_id).await
        }
        .await;

        match result {
            Ok(session) => self.attach_transport(call_id, session).await,
            Err(e) => self.fail_call(call_id, e.to_string()).await,
        }
    }

    /// Accept the transport leg behind an answered invite
    pub(crate) async fn accept_transport(self: &Arc<Self>, call_id: CallId, invite: CallInvite) {
        let result = async {
            let token = self.auth.scoped_token(&self.config.identity).await?;
            self.transport.accept(token, &invite, call_id).await
        }
        .await;

        match result {
            Ok(session) => self.attach_transport(call_id, session).await,
            Err(e) => self.fail_call(call_id, e.to_string()).await,
        }
    }

    /// Attach an accepted transport session to the active call
    ///
    /// If the call was retired while the open/accept was in flight, the fresh
    /// session is disconnected instead.
    async fn attach_transport(self: &Arc<Self>, call_id: CallId, session: TransportSession) {
        let attached = {
            let mut state = self.state.lock().await;
            match state.active.as_mut() {
                Some(call) if call.call_id == call_id => {
                    call.transport = Some(session.handle.clone());
                    if call.state == CallState::Requesting {
                        call.state = CallState::Connecting;
                        Some(true)
                    } else {
                        Some(false)
                    }
                }
                _ => None,
            }
        };

        let Some(advanced) = attached else {
            debug!(call_id = %call_id, "Call retired during transport setup; disconnecting session");
            if let Err(e) = self.transport.disconnect(&session.handle).await {
                warn!(call_id = %call_id, error = %e, "Failed to disconnect orphaned session");
            }
            return;
        };

        if advanced {
            if let Some(mut info) = self.call_history.get_mut(&call_id) {
                info.state = CallState::Connecting;
            }
            self.emit_state_change(call_id, CallState::Connecting, Some(CallState::Requesting), None)
                .await;
        }
        debug!(call_id = %call_id, handle = %session.handle, "Transport session attached");
        self.spawn_event_pump(call_id, session.events);
    }

    /// Pump a session's event stream into the orchestrator, in order
    fn spawn_event_pump(
        self: &Arc<Self>,
        call_id: CallId,
        mut events: tokio::sync::mpsc::Receiver<TransportEvent>,
    ) {
        let orchestrator = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.apply_transport_event(call_id, event).await;
            }
        });
    }

    // ===== TRANSPORT EVENTS =====

    /// Apply one transport lifecycle event to the active call
    pub(crate) async fn apply_transport_event(&self, call_id: CallId, event: TransportEvent) {
        match event {
            TransportEvent::Ringing => self.on_ringing(call_id).await,
            TransportEvent::Connected => self.on_connected(call_id).await,
            TransportEvent::Reconnecting { reason } => self.on_reconnecting(call_id, reason).await,
            TransportEvent::Disconnected { reason } => {
                self.on_disconnected(call_id, reason).await
            }
            TransportEvent::Failed { reason } => self.fail_call(call_id, reason).await,
            TransportEvent::QualityWarning { warnings } => {
                self.on_quality_warning(call_id, warnings).await
            }
        }
    }

    async fn on_ringing(&self, call_id: CallId) {
        let previous = {
            let mut state = self.state.lock().await;
            match state.active.as_mut() {
                Some(call) if call.call_id == call_id && call.state == CallState::Connecting => {
                    call.state = CallState::Ringing;
                    CallState::Connecting
                }
                Some(call) if call.call_id == call_id => {
                    debug!(call_id = %call_id, state = ?call.state, "Ringing event out of order; ignoring");
                    return;
                }
                _ => {
                    debug!(call_id = %call_id, "Ringing for retired call; ignoring");
                    return;
                }
            }
        };

        if let Some(mut info) = self.call_history.get_mut(&call_id) {
            info.state = CallState::Ringing;
        }
        self.emit_state_change(call_id, CallState::Ringing, Some(previous), None)
            .await;
    }

    async fn on_connected(&self, call_id: CallId) {
        let (previous, direction, first_connect, completion) = {
            let mut state = self.state.lock().await;
            match state.active.as_mut() {
                Some(call)
                    if call.call_id == call_id
                        && !call.state.is_terminal()
                        && call.state != CallState::Disconnecting =>
                {
                    let previous = call.state;
                    call.state = CallState::Connected;
                    // take() guarantees the completion fires at most once
                    let completion = call.completion.take();
                    (previous, call.direction, completion.is_some(), completion)
                }
                Some(call) if call.call_id == call_id => {
                    // A disconnect is already in flight; the Disconnected
                    // event that follows retires the call and resolves any
                    // pending completion.
                    debug!(call_id = %call_id, state = ?call.state, "Connected while disconnecting; ignoring");
                    return;
                }
                _ => {
                    debug!(call_id = %call_id, "Connected for retired call; ignoring");
                    return;
                }
            }
        };

        if let Some(tx) = completion {
            let _ = tx.send(Ok(()));
        }
        self.mark_connected(call_id);
        if first_connect {
            self.stats.lock().await.connected_calls += 1;
        }

        // Final phase of the deferred acknowledgment, first connect only
        if first_connect && direction == CallDirection::Outbound {
            if let Err(e) = self
                .telephony
                .report_outgoing(call_id, OutgoingPhase::Connected)
                .await
            {
                warn!(call_id = %call_id, error = %e, "Final outgoing report failed");
            }
        }

        info!(call_id = %call_id, "Call connected");
        self.emit_state_change(call_id, CallState::Connected, Some(previous), None)
            .await;
    }

    async fn on_reconnecting(&self, call_id: CallId, reason: String) {
        let previous = {
            let mut state = self.state.lock().await;
            match state.active.as_mut() {
                Some(call) if call.call_id == call_id && call.state == CallState::Connected => {
                    call.state = CallState::Reconnecting;
                    CallState::Connected
                }
                _ => {
                    debug!(call_id = %call_id, "Reconnecting for retired or unconnected call; ignoring");
                    return;
                }
            }
        };

        warn!(call_id = %call_id, reason = %reason, "Call reconnecting");
        if let Some(mut info) = self.call_history.get_mut(&call_id) {
            info.state = CallState::Reconnecting;
        }
        self.emit_state_change(call_id, CallState::Reconnecting, Some(previous), Some(reason))
            .await;
    }

    async fn on_disconnected(&self, call_id: CallId, reason: crate::transport::DisconnectReason) {
        let (previous, completion) = {
            let mut state = self.state.lock().await;
            let matches = matches!(state.active.as_ref(), Some(call) if call.call_id == call_id);
            if !matches {
                debug!(call_id = %call_id, "Disconnected for retired call; ignoring");
                return;
            }
            let Some(mut call) = state.active.take() else {
                return;
            };
            (call.state, call.completion.take())
        };

        if let Some(tx) = completion {
            // Never connected; resolve the pending setup as a failure
            let _ = tx.send(Err(ClientError::transport_failure(format!(
                "disconnected before connect: {:?}",
                reason
            ))));
        }

        info!(call_id = %call_id, previous = ?previous, reason = ?reason, "Call disconnected");
        self.retire_call(
            call_id,
            CallState::Ended,
            EndReason::Normal,
            Some(format!("{:?}", reason)),
        )
        .await;
    }

    /// Move the active call to Failed and retire it
    pub(crate) async fn fail_call(&self, call_id: CallId, reason: String) {
        let completion = {
            let mut state = self.state.lock().await;
            let matches = matches!(state.active.as_ref(), Some(call) if call.call_id == call_id);
            if !matches {
                debug!(call_id = %call_id, "Failure for retired call; ignoring");
                return;
            }
            let Some(mut call) = state.active.take() else {
                return;
            };
            call.completion.take()
        };

        if let Some(tx) = completion {
            let _ = tx.send(Err(ClientError::transport_failure(reason.clone())));
        }
        self.stats.lock().await.failed_calls += 1;

        warn!(call_id = %call_id, reason = %reason, "Call failed");
        self.emit(ClientEvent::ClientError {
            error: ClientError::transport_failure(reason.clone()),
            call_id: Some(call_id),
            priority: EventPriority::High,
        })
        .await;
        self.retire_call(call_id, CallState::Failed, EndReason::Failed, Some(reason))
            .await;
    }

    async fn on_quality_warning(&self, call_id: CallId, warnings: Vec<crate::transport::QualityWarning>) {
        let known = {
            let state = self.state.lock().await;
            matches!(state.active.as_ref(), Some(call) if call.call_id == call_id)
        };
        if !known {
            debug!(call_id = %call_id, "Quality warning for retired call; ignoring");
            return;
        }

        warn!(call_id = %call_id, warnings = ?warnings, "Call quality degraded");
        self.emit(ClientEvent::QualityWarning {
            call_id,
            warnings,
            priority: EventPriority::Low,
        })
        .await;
    }

    // ===== RETIREMENT =====

    /// Finalize a call that already vacated the active slot
    pub(crate) async fn retire_call(
        &self,
        call_id: CallId,
        final_state: CallState,
        end_reason: EndReason,
        detail: Option<String>,
    ) {
        if let Some(mut info) = self.call_history.get_mut(&call_id) {
            info.state = final_state;
            info.ended_at = Some(Utc::now());
            info.end_reason = Some(end_reason);
        }

        if let Err(e) = self.telephony.report_ended(call_id, end_reason).await {
            warn!(call_id = %call_id, error = %e, "Ended report failed");
        }
        self.emit_state_change(call_id, final_state, None, detail).await;
        self.emit(ClientEvent::CallEnded {
            call_id,
            reason: end_reason,
            priority: EventPriority::Normal,
        })
        .await;
    }

    /// Vacate the slot and retire, for paths where the transport could not
    /// confirm the disconnect
    pub(crate) async fn force_retire(
        &self,
        call_id: CallId,
        end_reason: EndReason,
        detail: Option<String>,
    ) {
        let completion = {
            let mut state = self.state.lock().await;
            let matches = matches!(state.active.as_ref(), Some(call) if call.call_id == call_id);
            if !matches {
                return;
            }
            let Some(mut call) = state.active.take() else {
                return;
            };
            call.completion.take()
        };
        if let Some(tx) = completion {
            let _ = tx.send(Err(ClientError::transport_failure(
                "call retired before setup completed",
            )));
        }
        self.retire_call(call_id, CallState::Ended, end_reason, detail)
            .await;
    }

    /// Emit a CallStateChanged event
    pub(crate) async fn emit_state_change(
        &self,
        call_id: CallId,
        new_state: CallState,
        previous_state: Option<CallState>,
        reason: Option<String>,
    ) {
        self.emit(ClientEvent::CallStateChanged {
            info: crate::events::CallStatusInfo {
                call_id,
                new_state,
                previous_state,
                reason,
                timestamp: Utc::now(),
            },
            priority: EventPriority::Normal,
        })
        .await;
    }
}
