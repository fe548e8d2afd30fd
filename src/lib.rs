//! Client-side data and session layer for the Automart vehicle-classifieds
//! API: credential lifecycle with refresh-and-retry, a TTL/coalescing query
//! cache, URL-backed search filter state, and a decoupled notification bus.
//!
//! The rendering layer is an external collaborator: it calls the typed
//! operations on [`Client`], keys its catalog views off [`FilterState`], and
//! subscribes to the [`NotificationBus`] for toasts.

pub mod api;
pub mod cache;
pub mod config;
pub mod filters;
pub mod gate;
pub mod notify;
pub mod session;
pub mod transport;
pub mod types;

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

pub use crate::cache::{QueryCache, QueryKey};
pub use crate::config::Config;
pub use crate::filters::{page_window, FilterCriteria, FilterState, PageWindow};
pub use crate::gate::{GateDecision, SessionGate};
pub use crate::notify::{Notification, NotificationBus, NotificationKind, Subscription};
pub use crate::session::{FileStorage, MemoryStorage, SessionStore, Storage};
pub use crate::transport::{ApiError, HttpBackend, ReqwestBackend, Transport};

/// All services of the data layer, explicitly constructed and wired
/// together. There are no ambient globals: tests build a fresh `Client`
/// (usually over a fake backend or a wiremock server) per case.
pub struct Client {
    pub(crate) config: Config,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) bus: NotificationBus,
    pub(crate) transport: Arc<Transport>,
    pub(crate) cache: QueryCache,
    pub(crate) schema_memory: RwLock<Option<(String, Instant)>>,
}

impl Client {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let backend = Arc::new(ReqwestBackend::new(&config)?);
        Ok(Self::with_backend(config, backend))
    }

    /// Wire the pipeline over an arbitrary backend. Session storage is file
    /// backed when the config names a session file, in-memory otherwise.
    pub fn with_backend(config: Config, backend: Arc<dyn HttpBackend>) -> Self {
        let storage: Arc<dyn Storage> = match &config.session_file {
            Some(path) => Arc::new(FileStorage::open(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        let store = Arc::new(SessionStore::new(storage));
        let bus = NotificationBus::new(config.notify_ttl);
        let transport = Arc::new(Transport::new(backend, store.clone(), bus.clone()));
        let cache = QueryCache::new(bus.clone(), config.read_retries);

        Self {
            config,
            store,
            bus,
            transport,
            cache,
            schema_memory: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn gate(&self) -> SessionGate {
        SessionGate::new(self.store.clone())
    }
}
