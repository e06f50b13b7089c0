//! Error types and handling for the client core
//!
//! This module defines all error types that can occur during call orchestration
//! and push-channel registration, and categorizes them for recovery decisions.
//!
//! # Error Categories
//!
//! - **Call Errors** - Slot occupancy, unknown call/invite ids, bad handles
//! - **Transport Errors** - The voice transport could not establish or keep a session
//! - **Registration Errors** - Push binding register/unregister problems
//! - **Auth Errors** - No valid credential for opening sessions or binding
//! - **Storage Errors** - Persisted binding could not be read or written
//!
//! Several of these are *expected races* rather than bugs: a command can
//! reference a call the orchestrator already retired because the UI and the
//! network race each other. Callers should treat `NoSuchCall` and
//! `NoSuchInvite` as log-and-ignore conditions.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for client core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types for call orchestration and push registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Call slot errors
    #[error("Already in a call: active call is {active_call_id}")]
    AlreadyInCall { active_call_id: Uuid },

    #[error("Invalid remote handle '{handle}': {reason}")]
    InvalidHandle { handle: String, reason: String },

    #[error("No such call: {call_id}")]
    NoSuchCall { call_id: Uuid },

    #[error("No such invite: {call_id}")]
    NoSuchInvite { call_id: Uuid },

    #[error("Invalid call state for call {call_id}: current state is {current_state:?}")]
    InvalidCallState {
        call_id: Uuid,
        current_state: crate::call::CallState,
    },

    /// Transport errors
    #[error("Transport failure: {reason}")]
    TransportFailure { reason: String },

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    /// Push registration errors
    #[error("Registration failed: {reason}")]
    RegistrationFailure { reason: String },

    /// Authentication errors
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Binding persistence errors
    #[error("Storage error: {reason}")]
    StorageError { reason: String },

    /// Push payload decoding errors
    #[error("Push payload decode error: {reason}")]
    PushDecodeError { reason: String },

    /// Generic errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    /// Create an invalid handle error
    pub fn invalid_handle(handle: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHandle {
            handle: handle.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport failure error
    pub fn transport_failure(reason: impl Into<String>) -> Self {
        Self::TransportFailure { reason: reason.into() }
    }

    /// Create a network error
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self::NetworkError { reason: reason.into() }
    }

    /// Create a registration failure error
    pub fn registration_failure(reason: impl Into<String>) -> Self {
        Self::RegistrationFailure { reason: reason.into() }
    }

    /// Create an unauthenticated error
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated { reason: reason.into() }
    }

    /// Create a storage error
    pub fn storage_error(reason: impl Into<String>) -> Self {
        Self::StorageError { reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Check if this error is an expected race between UI and network timing
    ///
    /// These are logged and ignored rather than surfaced as failures.
    pub fn is_expected_race(&self) -> bool {
        matches!(
            self,
            ClientError::NoSuchCall { .. } | ClientError::NoSuchInvite { .. }
        )
    }

    /// Check if this error is recoverable by a later retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Self-healing on the next relevant event
            ClientError::NetworkError { .. } | ClientError::RegistrationFailure { .. } => true,

            // Fixed input or credential is required first
            ClientError::InvalidHandle { .. } | ClientError::Unauthenticated { .. } => false,

            _ => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::AlreadyInCall { .. }
            | ClientError::InvalidHandle { .. }
            | ClientError::NoSuchCall { .. }
            | ClientError::NoSuchInvite { .. }
            | ClientError::InvalidCallState { .. } => "call",

            ClientError::TransportFailure { .. } | ClientError::NetworkError { .. } => "transport",

            ClientError::RegistrationFailure { .. } => "registration",

            ClientError::Unauthenticated { .. } => "auth",

            ClientError::StorageError { .. } => "storage",

            ClientError::PushDecodeError { .. } => "push",

            ClientError::InternalError { .. } => "system",
        }
    }
}
