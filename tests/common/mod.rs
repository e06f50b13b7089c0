//! Shared fakes for integration tests
//!
//! Each fake records the calls it receives so tests can assert on the exact
//! report/operation sequence, and exposes knobs to inject failures. The
//! transport fake hands the test the sending half of each session's event
//! channel so tests can script transport lifecycles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use dialtone_client_core::{
    AccessToken, AuthTokenProvider, CallId, CallInvite, CallState, ClientError, ClientEvent,
    ClientResult, DeviceToken, EndReason, OutgoingPhase, TelephonyIntegration, TransportEvent,
    TransportHandle, TransportSession, VoiceTransportProvider,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dialtone_client_core=debug")
        .with_test_writer()
        .try_init();
}

/// Auth provider that always hands out the same token
pub struct StaticAuth;

#[async_trait]
impl AuthTokenProvider for StaticAuth {
    async fn scoped_token(&self, _identity: &str) -> ClientResult<AccessToken> {
        Ok(AccessToken::new("test-token"))
    }
}

/// Auth provider with no credential
pub struct NoAuth;

#[async_trait]
impl AuthTokenProvider for NoAuth {
    async fn scoped_token(&self, _identity: &str) -> ClientResult<AccessToken> {
        Err(ClientError::unauthenticated("no credential"))
    }
}

/// Scriptable transport fake
///
/// Every `open`/`accept` creates a fresh session whose event sender is pushed
/// onto `sessions`; tests pop it to drive that session's lifecycle.
#[derive(Default)]
pub struct FakeTransport {
    pub sessions: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    pub opened: Mutex<Vec<(CallId, String)>>,
    pub accepted: Mutex<Vec<CallId>>,
    pub disconnected: Mutex<Vec<TransportHandle>>,
    pub registered: Mutex<Vec<DeviceToken>>,
    pub unregistered: Mutex<Vec<DeviceToken>>,
    pub fail_open: AtomicBool,
    pub fail_register: AtomicBool,
    pub fail_disconnect: AtomicBool,
    /// While set, open/accept blocks; lets tests win races deliberately
    pub hold_open: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn new_session(&self, call_id: CallId) -> TransportSession {
        let (tx, rx) = mpsc::channel(16);
        self.sessions.lock().await.push(tx);
        TransportSession {
            handle: TransportHandle::new(format!("S-{call_id}")),
            events: rx,
        }
    }

    /// Wait until the `n`-th session exists and return its event sender
    pub async fn session(&self, n: usize) -> mpsc::Sender<TransportEvent> {
        for _ in 0..200 {
            if let Some(tx) = self.sessions.lock().await.get(n - 1).cloned() {
                return tx;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transport session {n} was never created");
    }

    async fn wait_while_held(&self) {
        while self.hold_open.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl VoiceTransportProvider for FakeTransport {
    async fn open(
        &self,
        _token: AccessToken,
        remote_handle: &str,
        call_id: CallId,
    ) -> ClientResult<TransportSession> {
        self.wait_while_held().await;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ClientError::transport_failure("open refused"));
        }
        self.opened
            .lock()
            .await
            .push((call_id, remote_handle.to_string()));
        Ok(self.new_session(call_id).await)
    }

    async fn accept(
        &self,
        _token: AccessToken,
        _invite: &CallInvite,
        call_id: CallId,
    ) -> ClientResult<TransportSession> {
        self.wait_while_held().await;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ClientError::transport_failure("accept refused"));
        }
        self.accepted.lock().await.push(call_id);
        Ok(self.new_session(call_id).await)
    }

    async fn disconnect(&self, handle: &TransportHandle) -> ClientResult<()> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ClientError::transport_failure("disconnect refused"));
        }
        self.disconnected.lock().await.push(handle.clone());
        Ok(())
    }

    async fn register(&self, _token: AccessToken, device_token: &DeviceToken) -> ClientResult<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(ClientError::registration_failure("register refused"));
        }
        self.registered.lock().await.push(device_token.clone());
        Ok(())
    }

    async fn unregister(
        &self,
        _token: AccessToken,
        device_token: &DeviceToken,
    ) -> ClientResult<()> {
        self.unregistered.lock().await.push(device_token.clone());
        Ok(())
    }
}

/// One report issued to the native call surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Outgoing(CallId, OutgoingPhase),
    Incoming(CallId, String),
    Ended(CallId, EndReason),
}

/// Telephony fake recording the full report sequence
#[derive(Default)]
pub struct FakeTelephony {
    pub reports: Mutex<Vec<Report>>,
    pub refuse_incoming: AtomicBool,
}

impl FakeTelephony {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn reports(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl TelephonyIntegration for FakeTelephony {
    async fn report_outgoing(&self, call_id: CallId, phase: OutgoingPhase) -> ClientResult<()> {
        self.reports.lock().await.push(Report::Outgoing(call_id, phase));
        Ok(())
    }

    async fn report_incoming(&self, call_id: CallId, caller_handle: &str) -> ClientResult<()> {
        if self.refuse_incoming.load(Ordering::SeqCst) {
            return Err(ClientError::internal_error("UI refused"));
        }
        self.reports
            .lock()
            .await
            .push(Report::Incoming(call_id, caller_handle.to_string()));
        Ok(())
    }

    async fn report_ended(&self, call_id: CallId, reason: EndReason) -> ClientResult<()> {
        self.reports.lock().await.push(Report::Ended(call_id, reason));
        Ok(())
    }
}

/// Wait until the broadcast stream yields a `CallStateChanged` into `state`
pub async fn wait_for_state(
    rx: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
    call_id: CallId,
    state: CallState,
) {
    let deadline = Duration::from_secs(2);
    loop {
        let event = timeout(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {state:?}"))
            .expect("event channel closed");
        if let ClientEvent::CallStateChanged { info, .. } = event {
            if info.call_id == call_id && info.new_state == state {
                return;
            }
        }
    }
}

/// Wait until the broadcast stream yields `CallEnded` for `call_id`
pub async fn wait_for_ended(
    rx: &mut tokio::sync::broadcast::Receiver<ClientEvent>,
    call_id: CallId,
) -> EndReason {
    let deadline = Duration::from_secs(2);
    loop {
        let event = timeout(deadline, rx.recv())
            .await
            .expect("timed out waiting for CallEnded")
            .expect("event channel closed");
        if let ClientEvent::CallEnded { call_id: id, reason, .. } = event {
            if id == call_id {
                return reason;
            }
        }
    }
}
