//! RequestEngine - keeps three request views in sync with a remote store.
//!
//! The engine is an explicit object: construct one per signed-in app
//! session owner and hand clones to whoever needs to read views or call
//! operations. Clones share state.
//!
//! ## Architecture
//!
//! ```text
//! identity change ──► lifecycle ──► fetch_all + fetch_mine (timeout)
//!                        │                    │
//!                        ▼                    ▼
//!                    subscribe ──► change feed ──► coalescer ──► re-fetch
//! ```
//!
//! Views are only replaced by a fetch whose ticket is still current: same
//! session epoch, latest sequence for that view. Everything else is dropped
//! on the floor, which is what keeps late responses from resurrecting state
//! after sign-out or teardown.
//!
//! ## Example
//!
//! ```ignore
//! use neighbor_sync::{RequestEngine, SessionIdentity};
//! use neighbor_sync::store::InMemoryRequestStore;
//!
//! let engine = RequestEngine::new(InMemoryRequestStore::new());
//! let identity = SessionIdentity::new();
//! engine.start(&identity);
//!
//! identity.sign_in("user-1");
//! // ... later
//! for request in engine.requests().iter() {
//!     println!("{} ({})", request.title, request.location);
//! }
//! engine.teardown().await;
//! ```

mod config;
#[cfg(feature = "emitter")]
mod emitter;
mod error;
mod fetch;
mod lifecycle;
mod mutations;
mod realtime;
mod state;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::request::{Request, UserId};
use crate::store::RequestStore;

pub use config::EngineConfig;
#[cfg(feature = "emitter")]
pub use emitter::{ViewChange, VIEW_CHANGED};
pub use error::EngineError;
pub use lifecycle::RefreshOutcome;
pub use realtime::RealtimeStats;
pub use state::{EngineSnapshot, FetchOutcome, LifecycleState, ViewKind};

use realtime::{ActiveSubscription, RealtimeCounters};
use state::EngineState;

pub(crate) struct EngineInner {
    store: Arc<dyn RequestStore>,
    config: EngineConfig,
    state: Mutex<EngineState>,
    /// Held across the subscribe/unsubscribe awaits so at most one feed is open.
    subscription: tokio::sync::Mutex<Option<ActiveSubscription>>,
    realtime: RealtimeCounters,
    /// Identity watcher.
    watcher: Mutex<Option<JoinHandle<()>>>,
    #[cfg(feature = "emitter")]
    views: emitter::ViewEmitter,
}

/// Client-side synchronization engine for help requests.
#[derive(Clone)]
pub struct RequestEngine {
    inner: Arc<EngineInner>,
}

impl RequestEngine {
    /// Create an engine over `store` with the default config.
    pub fn new<S: RequestStore + 'static>(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config<S: RequestStore + 'static>(store: S, config: EngineConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create an engine over a store that is shared with other owners.
    pub fn from_shared(store: Arc<dyn RequestStore>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                state: Mutex::new(EngineState::default()),
                subscription: tokio::sync::Mutex::new(None),
                realtime: RealtimeCounters::default(),
                watcher: Mutex::new(None),
                #[cfg(feature = "emitter")]
                views: emitter::ViewEmitter::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    /// Lock engine state. Nothing panics while holding it, but a poisoned
    /// lock still holds consistent data, so recover rather than propagate.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn store(&self) -> &dyn RequestStore {
        self.inner.store.as_ref()
    }

    #[cfg(feature = "emitter")]
    pub(crate) fn emit_change(&self, view: ViewKind, len: usize) {
        self.inner.views.emit(view, len);
    }

    #[cfg(not(feature = "emitter"))]
    pub(crate) fn emit_change(&self, _view: ViewKind, _len: usize) {}

    pub(crate) fn record_error(&self, epoch: u64, err: &EngineError) {
        let mut state = self.lock();
        if state.accepts(epoch) {
            state.error = Some(err.clone());
        }
    }

    // ---------------------------------------------------------------------
    // Read side
    // ---------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lock().lifecycle
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.lock().user.clone()
    }

    /// Everyone else's requests, newest first (or nearest first when the
    /// last fetch used a radius).
    pub fn requests(&self) -> Arc<Vec<Request>> {
        self.lock().requests.snapshot()
    }

    pub fn my_requests(&self) -> Arc<Vec<Request>> {
        self.lock().my_requests.snapshot()
    }

    pub fn nearby_requests(&self) -> Arc<Vec<Request>> {
        self.lock().nearby.snapshot()
    }

    pub fn view(&self, view: ViewKind) -> Arc<Vec<Request>> {
        self.lock().slot(view).snapshot()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::capture(&self.lock())
    }

    /// Look a request up in `requests`, then `my_requests`, then nearby.
    pub fn get_request_by_id(&self, id: &str) -> Option<Request> {
        let state = self.lock();
        [ViewKind::Requests, ViewKind::MyRequests, ViewKind::Nearby]
            .into_iter()
            .find_map(|view| state.slot(view).find(id).cloned())
    }

    /// Message of the last recorded error.
    pub fn error(&self) -> Option<String> {
        self.lock().error.as_ref().map(|e| e.to_string())
    }

    pub fn last_error(&self) -> Option<EngineError> {
        self.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn is_loading(&self) -> bool {
        self.lifecycle() == LifecycleState::Initializing
    }

    pub fn is_refreshing(&self) -> bool {
        self.lifecycle() == LifecycleState::Refreshing
    }

    pub fn is_loading_nearby(&self) -> bool {
        self.lock().nearby_in_flight > 0
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    pub fn realtime_stats(&self) -> RealtimeStats {
        self.inner.realtime.snapshot()
    }

    /// Register a listener for view replacements. Returns an id for
    /// `remove_view_listener`.
    #[cfg(feature = "emitter")]
    pub fn on_view_change<F>(&self, listener: F) -> String
    where
        F: Fn(ViewChange) + Send + Sync + 'static,
    {
        self.inner.views.on(listener)
    }

    #[cfg(feature = "emitter")]
    pub fn remove_view_listener(&self, id: &str) -> bool {
        self.inner.views.remove(id)
    }
}
