//! Inbound call invites and their two-key lookup table
//!
//! An invite is keyed two ways because the protocol identifies it two ways:
//! the push invite carries the remote-assigned call id, but a later
//! cancellation may reference the invite only by its call-leg id. The table
//! keeps both indexes consistent so either key removes the invite exactly
//! once.
//!
//! Each stored invite owns a cancellable timeout task; removal through any
//! path aborts the timer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::call::CallId;

/// Call-leg identifier assigned by the transport provider
///
/// Secondary correlation key for an invite; cancellation events may carry
/// only this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallLegId(pub String);

impl CallLegId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallLegId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending inbound call invitation awaiting accept/reject
#[derive(Debug, Clone)]
pub struct CallInvite {
    /// Call identifier assigned by the remote party (arrives via push)
    pub call_id: CallId,
    /// Secondary correlation key for cancellation events
    pub call_leg_id: CallLegId,
    /// Caller handle (number or identity)
    pub caller_handle: String,
    /// When the invite was received
    pub received_at: DateTime<Utc>,
    /// Whether the caller identity was verified by the transport provider
    pub verified: bool,
}

struct InviteEntry {
    invite: CallInvite,
    /// Timeout task armed when the invite was stored; aborted on removal
    timeout: Option<JoinHandle<()>>,
}

/// Two-key invite table: primary call id, secondary call-leg id
///
/// Not internally synchronized; the orchestrator accesses it under its state
/// mutex.
#[derive(Default)]
pub struct InviteTable {
    by_id: HashMap<CallId, InviteEntry>,
    by_leg: HashMap<CallLegId, CallId>,
}

impl InviteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an invite. Returns false (and leaves the table unchanged) if an
    /// invite with the same call id already exists.
    pub fn insert(&mut self, invite: CallInvite, timeout: Option<JoinHandle<()>>) -> bool {
        if self.by_id.contains_key(&invite.call_id) {
            if let Some(timeout) = timeout {
                timeout.abort();
            }
            return false;
        }
        self.by_leg.insert(invite.call_leg_id.clone(), invite.call_id);
        self.by_id.insert(invite.call_id, InviteEntry { invite, timeout });
        true
    }

    pub fn contains(&self, call_id: &CallId) -> bool {
        self.by_id.contains_key(call_id)
    }

    pub fn get(&self, call_id: &CallId) -> Option<&CallInvite> {
        self.by_id.get(call_id).map(|e| &e.invite)
    }

    /// Remove by primary key, aborting the invite's timeout
    pub fn remove_by_id(&mut self, call_id: &CallId) -> Option<CallInvite> {
        let entry = self.by_id.remove(call_id)?;
        self.by_leg.remove(&entry.invite.call_leg_id);
        if let Some(timeout) = entry.timeout {
            timeout.abort();
        }
        Some(entry.invite)
    }

    /// Remove by secondary key, aborting the invite's timeout
    pub fn remove_by_leg(&mut self, call_leg_id: &CallLegId) -> Option<CallInvite> {
        let call_id = self.by_leg.remove(call_leg_id)?;
        let entry = self.by_id.remove(&call_id)?;
        if let Some(timeout) = entry.timeout {
            timeout.abort();
        }
        Some(entry.invite)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drain every invite, aborting all timers (used at shutdown)
    pub fn clear(&mut self) -> Vec<CallInvite> {
        self.by_leg.clear();
        self.by_id
            .drain()
            .map(|(_, entry)| {
                if let Some(timeout) = entry.timeout {
                    timeout.abort();
                }
                entry.invite
            })
            .collect()
    }
}
