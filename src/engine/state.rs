//! Engine state: lifecycle, the three views, and the freshness bookkeeping
//! that decides whether a fetch result may still be applied.
//!
//! Two counters guard every write:
//! - `epoch` changes whenever the session ends (sign-out, user switch,
//!   teardown). Results from an older epoch are discarded.
//! - each view's `issued` sequence is bumped when a fetch for that view
//!   starts. Only the latest issued fetch may replace the view.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use crate::filter::RequestFilter;
use crate::request::{Request, UserId};
use crate::store::SubscriptionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No user yet, or the user signed out.
    Uninitialized,
    /// First load in progress.
    Initializing,
    Ready,
    /// Manual refresh in progress; returns to `Ready`.
    Refreshing,
    /// Terminal.
    TornDown,
}

/// The three derived views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Everyone else's requests, newest first.
    Requests,
    /// The current user's requests, newest first.
    MyRequests,
    /// Open requests within a radius, nearest first.
    Nearby,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Requests => "requests",
            ViewKind::MyRequests => "my_requests",
            ViewKind::Nearby => "nearby_requests",
        }
    }
}

/// Result of one fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The view was replaced with `len` requests.
    Applied { len: usize },
    /// No signed-in user (or torn down); nothing was queried.
    Skipped,
    /// A newer fetch for the same view was issued; this result was dropped.
    Superseded,
    /// The session ended while the fetch was in flight; result dropped.
    Discarded,
    /// The store failed. The view kept its previous contents.
    Failed(EngineError),
}

impl FetchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FetchOutcome::Applied { .. })
    }
}

/// Ticket handed to a fetch when it starts and presented when it lands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchTicket {
    pub view: ViewKind,
    pub epoch: u64,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ViewSlot {
    items: Arc<Vec<Request>>,
    issued: u64,
}

impl ViewSlot {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_latest(&self, seq: u64) -> bool {
        self.issued == seq
    }

    pub fn replace(&mut self, items: Vec<Request>) {
        self.items = Arc::new(items);
    }

    pub fn clear(&mut self) {
        self.items = Arc::new(Vec::new());
    }

    pub fn snapshot(&self) -> Arc<Vec<Request>> {
        Arc::clone(&self.items)
    }

    pub fn find(&self, id: &str) -> Option<&Request> {
        self.items.iter().find(|r| r.id == id)
    }
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub lifecycle: LifecycleState,
    pub user: Option<UserId>,
    pub epoch: u64,
    /// Reached `Ready` at least once in this session.
    pub initialized: bool,
    pub requests: ViewSlot,
    pub my_requests: ViewSlot,
    pub nearby: ViewSlot,
    /// Filter of the most recent `fetch_all`, reused by refreshes.
    pub last_filter: RequestFilter,
    pub error: Option<EngineError>,
    pub nearby_in_flight: usize,
    pub subscription: Option<SubscriptionId>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::Uninitialized,
            user: None,
            epoch: 0,
            initialized: false,
            requests: ViewSlot::default(),
            my_requests: ViewSlot::default(),
            nearby: ViewSlot::default(),
            last_filter: RequestFilter::default(),
            error: None,
            nearby_in_flight: 0,
            subscription: None,
        }
    }
}

impl EngineState {
    pub fn slot(&self, view: ViewKind) -> &ViewSlot {
        match view {
            ViewKind::Requests => &self.requests,
            ViewKind::MyRequests => &self.my_requests,
            ViewKind::Nearby => &self.nearby,
        }
    }

    pub fn slot_mut(&mut self, view: ViewKind) -> &mut ViewSlot {
        match view {
            ViewKind::Requests => &mut self.requests,
            ViewKind::MyRequests => &mut self.my_requests,
            ViewKind::Nearby => &mut self.nearby,
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.lifecycle == LifecycleState::TornDown
    }

    /// Whether results issued under `epoch` may still be written.
    pub fn accepts(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.is_torn_down()
    }

    /// End the current session: new epoch, empty views, no user.
    pub fn reset_session(&mut self) {
        self.epoch += 1;
        self.user = None;
        self.lifecycle = LifecycleState::Uninitialized;
        self.initialized = false;
        self.requests.clear();
        self.my_requests.clear();
        self.nearby.clear();
        self.last_filter = RequestFilter::default();
        self.error = None;
        self.nearby_in_flight = 0;
    }
}

/// A consistent read of every view and flag.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub lifecycle: LifecycleState,
    pub user: Option<UserId>,
    pub requests: Arc<Vec<Request>>,
    pub my_requests: Arc<Vec<Request>>,
    pub nearby_requests: Arc<Vec<Request>>,
    pub error: Option<String>,
    pub is_initialized: bool,
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub is_loading_nearby: bool,
    pub is_subscribed: bool,
}

impl EngineSnapshot {
    pub(crate) fn capture(state: &EngineState) -> Self {
        Self {
            lifecycle: state.lifecycle,
            user: state.user.clone(),
            requests: state.requests.snapshot(),
            my_requests: state.my_requests.snapshot(),
            nearby_requests: state.nearby.snapshot(),
            error: state.error.as_ref().map(|e| e.to_string()),
            is_initialized: state.initialized,
            is_loading: state.lifecycle == LifecycleState::Initializing,
            is_refreshing: state.lifecycle == LifecycleState::Refreshing,
            is_loading_nearby: state.nearby_in_flight > 0,
            is_subscribed: state.subscription.is_some(),
        }
    }
}
