//! Builder for [`CallOrchestrator`]
//!
//! The orchestrator takes every external capability as an injected trait
//! object; the builder is the composition root that wires them together.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use dialtone_client_core::*;
//! # fn wire(auth: Arc<dyn AuthTokenProvider>,
//! #         transport: Arc<dyn VoiceTransportProvider>,
//! #         telephony: Arc<dyn TelephonyIntegration>) -> ClientResult<()> {
//! let orchestrator = CallOrchestratorBuilder::new(ClientConfig::new("alice@example.com"))
//!     .auth(auth)
//!     .transport(transport)
//!     .telephony(telephony)
//!     .binding_store(Arc::new(JsonFileBindingStore::new("/var/lib/dialtone/binding.json")))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::auth::AuthTokenProvider;
use crate::call::CallStats;
use crate::config::ClientConfig;
use crate::invite::InviteTable;
use crate::registration::{BindingStore, MemoryBindingStore, PushRegistrationManager};
use crate::telephony::TelephonyIntegration;
use crate::transport::VoiceTransportProvider;

use super::{CallOrchestrator, OrchestratorState, EVENT_CHANNEL_CAPACITY};

/// Composition-root builder for the orchestrator
pub struct CallOrchestratorBuilder {
    config: ClientConfig,
    auth: Option<Arc<dyn AuthTokenProvider>>,
    transport: Option<Arc<dyn VoiceTransportProvider>>,
    telephony: Option<Arc<dyn TelephonyIntegration>>,
    binding_store: Option<Arc<dyn BindingStore>>,
}

impl CallOrchestratorBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            auth: None,
            transport: None,
            telephony: None,
            binding_store: None,
        }
    }

    /// Set the authorization token provider (required)
    pub fn auth(mut self, auth: Arc<dyn AuthTokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the voice transport provider (required)
    pub fn transport(mut self, transport: Arc<dyn VoiceTransportProvider>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the native call surface integration (required)
    pub fn telephony(mut self, telephony: Arc<dyn TelephonyIntegration>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    /// Set the binding store (defaults to an in-memory store)
    pub fn binding_store(mut self, store: Arc<dyn BindingStore>) -> Self {
        self.binding_store = Some(store);
        self
    }

    /// Build the orchestrator
    ///
    /// Fails if a required capability was not provided.
    pub fn build(self) -> crate::error::ClientResult<Arc<CallOrchestrator>> {
        let auth = self
            .auth
            .ok_or_else(|| crate::error::ClientError::internal_error("auth token provider is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| crate::error::ClientError::internal_error("voice transport provider is required"))?;
        let telephony = self
            .telephony
            .ok_or_else(|| crate::error::ClientError::internal_error("telephony integration is required"))?;
        let store = self
            .binding_store
            .unwrap_or_else(|| Arc::new(MemoryBindingStore::new()));

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registration = PushRegistrationManager::new(
            &self.config,
            Arc::clone(&auth),
            Arc::clone(&transport),
            store,
            event_tx.clone(),
        );

        Ok(Arc::new(CallOrchestrator {
            config: self.config,
            auth,
            transport,
            telephony,
            registration,
            state: Mutex::new(OrchestratorState {
                active: None,
                invites: InviteTable::new(),
            }),
            call_history: dashmap::DashMap::new(),
            stats: Mutex::new(CallStats::default()),
            event_tx,
            handler: RwLock::new(None),
        }))
    }
}
