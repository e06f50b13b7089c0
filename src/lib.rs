//! Dialtone client-core: mobile voice-call session coordination
//!
//! This crate is the platform-independent core of a mobile VoIP client. It
//! owns call and invite state and coordinates three injected capabilities:
//!
//! - a voice transport provider (opens sessions, delivers lifecycle events),
//! - the native telephony surface (system incoming/outgoing call UI),
//! - an auth token provider (scoped access tokens for the transport).
//!
//! ## Layer separation
//! ```text
//! native UI / push delivery -> client-core -> {transport SDK, system call UI}
//! ```
//!
//! Client-core focuses on:
//! - Single-slot call state machine with deferred setup acknowledgment
//! - Push-delivered invite correlation (call id + call leg id)
//! - Device push-token registration with TTL-bound renewal
//! - Event delivery for UI integration
//!
//! Audio, codecs, and the wire protocol are the transport provider's concern.

pub mod auth;
pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod invite;
pub mod orchestrator;
pub mod push;
pub mod registration;
pub mod telephony;
pub mod transport;

// Public API exports
pub use auth::{AccessToken, AuthTokenProvider};
pub use call::{CallDirection, CallId, CallInfo, CallState, CallStats, EndReason};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::{
    BindingStatusInfo, CallStatusInfo, ClientEvent, ClientEventHandler, EventPriority,
    IncomingCallInfo,
};
pub use invite::{CallInvite, CallLegId};
pub use orchestrator::{CallOrchestrator, CallOrchestratorBuilder, PendingCall};
pub use push::{CancelReason, DeviceToken, PushEvent};
pub use registration::{
    needs_registration, BindingStatus, BindingStore, DeviceBinding, JsonFileBindingStore,
    MemoryBindingStore, PushRegistrationManager,
};
pub use telephony::{OutgoingPhase, TelephonyIntegration};
pub use transport::{
    DisconnectReason, QualityWarning, TransportEvent, TransportHandle, TransportSession,
    VoiceTransportProvider,
};

/// Client-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
