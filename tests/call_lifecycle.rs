//! Integration tests for the outbound call lifecycle
//!
//! Drives the orchestrator through full call setups and teardowns with
//! scripted transport events, asserting on state transitions, the two-phase
//! report sequence, and completion semantics.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use dialtone_client_core::{
    CallOrchestratorBuilder, CallState, ClientConfig, ClientError, DisconnectReason, EndReason,
    OutgoingPhase, TransportEvent,
};

use common::{init_tracing, FakeTelephony, FakeTransport, Report, StaticAuth};

fn build(
    transport: Arc<FakeTransport>,
    telephony: Arc<FakeTelephony>,
) -> Arc<dialtone_client_core::CallOrchestrator> {
    CallOrchestratorBuilder::new(ClientConfig::new("alice@example.com"))
        .auth(Arc::new(StaticAuth))
        .transport(transport)
        .telephony(telephony)
        .build()
        .expect("build orchestrator")
}

/// Full happy path: request, ring, connect, hang up
#[tokio::test]
async fn test_outbound_call_happy_path() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;

    // The command returns with the call already created
    let info = orchestrator.active_call().await.expect("active call");
    assert_eq!(info.call_id, call_id);

    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;

    session.send(TransportEvent::Ringing).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Ringing).await;

    session.send(TransportEvent::Connected).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Connected).await;

    // Deferred acknowledgment resolves on connect
    let result = timeout(Duration::from_secs(2), pending.completion)
        .await
        .expect("completion timed out")
        .expect("completion sender dropped");
    assert!(result.is_ok());

    // Provisional then final outgoing report, in that order
    let reports = telephony.reports().await;
    assert_eq!(
        reports,
        vec![
            Report::Outgoing(call_id, OutgoingPhase::Connecting),
            Report::Outgoing(call_id, OutgoingPhase::Connected),
        ]
    );

    orchestrator.end_active_call().await.expect("end call");
    common::wait_for_state(&mut events, call_id, CallState::Disconnecting).await;
    session
        .send(TransportEvent::Disconnected {
            reason: DisconnectReason::Hangup,
        })
        .await
        .unwrap();
    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Normal);

    assert!(orchestrator.active_call().await.is_none());
    let info = orchestrator.call_info(&call_id).await.expect("call info");
    assert_eq!(info.state, CallState::Ended);
    assert_eq!(info.end_reason, Some(EndReason::Normal));
    assert!(info.connected_at.is_some());
    assert!(info.ended_at.is_some());

    let stats = orchestrator.call_stats().await;
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.connected_calls, 1);
    assert_eq!(stats.failed_calls, 0);
}

/// A second request while a call is active is refused
#[tokio::test]
async fn test_single_call_slot() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(transport, telephony);

    let pending = orchestrator
        .request_outbound_call("+15551230001")
        .await
        .expect("first call");

    let err = orchestrator
        .request_outbound_call("+15551230002")
        .await
        .expect_err("second call must be refused");
    assert_eq!(
        err,
        ClientError::AlreadyInCall {
            active_call_id: pending.call_id
        }
    );
}

/// Transport refuses the session: call fails and the completion errors
#[tokio::test]
async fn test_open_failure_fails_call() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    transport.fail_open.store(true, Ordering::SeqCst);
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;

    let result = timeout(Duration::from_secs(2), pending.completion)
        .await
        .expect("completion timed out")
        .expect("completion sender dropped");
    assert!(matches!(result, Err(ClientError::TransportFailure { .. })));

    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Failed);

    assert!(orchestrator.active_call().await.is_none());
    let info = orchestrator.call_info(&call_id).await.expect("call info");
    assert_eq!(info.state, CallState::Failed);

    let stats = orchestrator.call_stats().await;
    assert_eq!(stats.failed_calls, 1);
    assert_eq!(stats.connected_calls, 0);
}

/// Ending before the transport accepted retires the call immediately
#[tokio::test]
async fn test_end_before_transport_setup() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    transport.hold_open.store(true, Ordering::SeqCst);
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;

    orchestrator.end_active_call().await.expect("end call");
    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Normal);
    assert!(orchestrator.active_call().await.is_none());

    let result = timeout(Duration::from_secs(2), pending.completion)
        .await
        .expect("completion timed out")
        .expect("completion sender dropped");
    assert!(result.is_err());

    // The late session is torn down once it finally arrives
    transport.hold_open.store(false, Ordering::SeqCst);
    let mut disconnected = false;
    for _ in 0..200 {
        if !transport.disconnected.lock().await.is_empty() {
            disconnected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(disconnected, "orphaned session must be disconnected");

    // The slot is free again
    orchestrator
        .request_outbound_call("+15551230002")
        .await
        .expect("slot must be free after retirement");
}

/// The completion fires once even when the call reconnects
#[tokio::test]
async fn test_reconnect_cycle_reports_connect_once() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;

    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;

    session.send(TransportEvent::Connected).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Connected).await;
    session
        .send(TransportEvent::Reconnecting {
            reason: "network path changed".to_string(),
        })
        .await
        .unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Reconnecting).await;
    session.send(TransportEvent::Connected).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Connected).await;

    let connected_reports = telephony
        .reports()
        .await
        .into_iter()
        .filter(|r| matches!(r, Report::Outgoing(_, OutgoingPhase::Connected)))
        .count();
    assert_eq!(connected_reports, 1);

    let stats = orchestrator.call_stats().await;
    assert_eq!(stats.connected_calls, 1);
}

/// End is idempotent: racing or repeated end commands are no-ops
#[tokio::test]
async fn test_end_is_idempotent() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    // No active call at all
    orchestrator.end_active_call().await.expect("no-op end");

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;
    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;
    session.send(TransportEvent::Connected).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Connected).await;

    orchestrator.end_active_call().await.expect("first end");
    // Second end while disconnecting must not error
    orchestrator.end_active_call().await.expect("second end");

    assert_eq!(transport.disconnected.lock().await.len(), 1);
}

/// A disconnect the transport cannot confirm still frees the slot
#[tokio::test]
async fn test_disconnect_failure_retires_locally() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;
    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;
    session.send(TransportEvent::Connected).await.unwrap();
    common::wait_for_state(&mut events, call_id, CallState::Connected).await;

    transport.fail_disconnect.store(true, Ordering::SeqCst);
    orchestrator.end_active_call().await.expect("end call");

    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Normal);
    assert!(orchestrator.active_call().await.is_none());
}

/// Late transport events for a retired call are discarded
#[tokio::test]
async fn test_late_events_ignored() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;
    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;

    session
        .send(TransportEvent::Failed {
            reason: "ice failed".to_string(),
        })
        .await
        .unwrap();
    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Failed);

    // The transport keeps talking after the call is gone
    session.send(TransportEvent::Connected).await.unwrap();
    session.send(TransportEvent::Ringing).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let info = orchestrator.call_info(&call_id).await.expect("call info");
    assert_eq!(info.state, CallState::Failed);
    assert!(orchestrator.active_call().await.is_none());
}

/// A Connected event racing a user-initiated end must not revive the call
#[tokio::test]
async fn test_late_connected_does_not_override_disconnect() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), Arc::clone(&telephony));
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("+15551234567")
        .await
        .expect("request call");
    let call_id = pending.call_id;
    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;
    let session = transport.session(1).await;

    // End before the transport connects; a Connected event is already in flight
    orchestrator.end_active_call().await.expect("end call");
    common::wait_for_state(&mut events, call_id, CallState::Disconnecting).await;
    session.send(TransportEvent::Connected).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let info = orchestrator.active_call().await.expect("still disconnecting");
    assert_eq!(info.state, CallState::Disconnecting);
    assert!(!telephony
        .reports()
        .await
        .contains(&Report::Outgoing(call_id, OutgoingPhase::Connected)));

    // The transport confirms the disconnect and the setup resolves as failed
    session
        .send(TransportEvent::Disconnected {
            reason: DisconnectReason::Cancelled,
        })
        .await
        .unwrap();
    let reason = common::wait_for_ended(&mut events, call_id).await;
    assert_eq!(reason, EndReason::Normal);

    let result = timeout(Duration::from_secs(2), pending.completion)
        .await
        .expect("completion timed out")
        .expect("completion sender dropped");
    assert!(result.is_err());

    let stats = orchestrator.call_stats().await;
    assert_eq!(stats.connected_calls, 0);
}

/// Surrounding whitespace is stripped before the handle is stored or dialed
#[tokio::test]
async fn test_handle_whitespace_trimmed() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(Arc::clone(&transport), telephony);
    let mut events = orchestrator.subscribe_events();

    let pending = orchestrator
        .request_outbound_call("  +15551234567 ")
        .await
        .expect("request call");
    let call_id = pending.call_id;
    common::wait_for_state(&mut events, call_id, CallState::Connecting).await;

    let info = orchestrator.call_info(&call_id).await.expect("call info");
    assert_eq!(info.remote_handle, "+15551234567");
    assert_eq!(
        transport.opened.lock().await.as_slice(),
        &[(call_id, "+15551234567".to_string())]
    );
}

/// Bad handles are rejected before any state is created
#[tokio::test]
async fn test_invalid_handle_rejected() {
    init_tracing();
    let transport = FakeTransport::new();
    let telephony = FakeTelephony::new();
    let orchestrator = build(transport, Arc::clone(&telephony));

    let err = orchestrator
        .request_outbound_call("")
        .await
        .expect_err("empty handle");
    assert!(matches!(err, ClientError::InvalidHandle { .. }));

    assert!(orchestrator.active_call().await.is_none());
    assert_eq!(orchestrator.call_stats().await.total_calls, 0);
    assert!(telephony.reports().await.is_empty());
}
