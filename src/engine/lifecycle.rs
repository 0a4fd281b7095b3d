//! Session lifecycle: identity transitions, first load, refresh, teardown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::state::{LifecycleState, ViewKind};
use super::RequestEngine;
use crate::filter::RequestFilter;
use crate::identity::IdentityProvider;
use crate::request::UserId;

/// How a manual refresh ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Both fetches landed inside the refresh timeout.
    Completed,
    /// Stopped waiting; the fetches may still land later.
    TimedOut,
    /// The engine was not `Ready`.
    Skipped,
}

/// What an identity change did to the session, decided synchronously so
/// that changes apply in the order they were observed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IdentityTransition {
    Unchanged,
    SignedOut { epoch: u64 },
    SignedIn { epoch: u64, replaced: bool },
}

impl RequestEngine {
    fn transition_identity(&self, user: Option<UserId>) -> IdentityTransition {
        let transition = {
            let mut state = self.lock();
            if state.is_torn_down() || state.user == user {
                return IdentityTransition::Unchanged;
            }

            let replaced = state.user.is_some();
            if replaced {
                state.reset_session();
            }
            match user {
                None => IdentityTransition::SignedOut { epoch: state.epoch },
                Some(user) => {
                    state.user = Some(user);
                    state.lifecycle = LifecycleState::Initializing;
                    IdentityTransition::SignedIn {
                        epoch: state.epoch,
                        replaced,
                    }
                }
            }
        };

        let cleared = matches!(
            transition,
            IdentityTransition::SignedOut { .. } | IdentityTransition::SignedIn { replaced: true, .. }
        );
        if cleared {
            for view in [ViewKind::Requests, ViewKind::MyRequests, ViewKind::Nearby] {
                self.emit_change(view, 0);
            }
        }
        transition
    }

    async fn drive(&self, transition: IdentityTransition) {
        match transition {
            IdentityTransition::Unchanged => {}
            IdentityTransition::SignedOut { epoch } => {
                info!(epoch, "signed out; request views cleared");
                self.unsubscribe_before(epoch).await;
            }
            IdentityTransition::SignedIn { epoch, replaced } => {
                if replaced {
                    info!(epoch, "user switched; request views cleared");
                    self.unsubscribe_before(epoch).await;
                }
                self.initialize(epoch).await;
            }
        }
    }

    /// Apply an identity change and wait for the resulting first load (or
    /// unsubscribe) to finish.
    ///
    /// `None` signs out: all three views are cleared and every in-flight
    /// fetch result is ignored. A different user is a sign-out followed by
    /// a sign-in. The follow-up work runs on its own task, so dropping this
    /// future still leaves the session `Ready` and subscribed.
    pub async fn set_user(&self, user: Option<UserId>) {
        let transition = self.transition_identity(user);
        if transition == IdentityTransition::Unchanged {
            return;
        }
        let engine = self.clone();
        if let Err(err) = tokio::spawn(async move { engine.drive(transition).await }).await {
            warn!(error = %err, "identity change task failed");
        }
    }

    fn apply_identity(&self, user: Option<UserId>) {
        let transition = self.transition_identity(user);
        if transition != IdentityTransition::Unchanged {
            let engine = self.clone();
            tokio::spawn(async move { engine.drive(transition).await });
        }
    }

    /// Follow `identity`: the current value is applied immediately and every
    /// later change in order. Replaces any earlier watcher.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self, identity: &dyn IdentityProvider) {
        if self.lock().is_torn_down() {
            return;
        }

        let mut changes = identity.watch();
        let current = changes.borrow_and_update().clone();
        self.apply_identity(current);

        let engine = Arc::downgrade(&self.inner);
        let watcher = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let user = changes.borrow_and_update().clone();
                let Some(inner) = engine.upgrade() else {
                    return;
                };
                RequestEngine::from_inner(inner).apply_identity(user);
            }
            debug!("identity source closed");
        });

        let previous = self.watcher().replace(watcher);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn watcher(&self) -> std::sync::MutexGuard<'_, Option<tokio::task::JoinHandle<()>>> {
        self.inner
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// First load for the session `epoch`. Reaches `Ready` whether or not
    /// the fetches succeeded or finished in time.
    async fn initialize(&self, epoch: u64) {
        info!(epoch, "initializing request views");
        let timeout = self.config().init_timeout();
        if !self.run_concurrently(RequestFilter::default(), timeout).await {
            warn!(timeout_ms = timeout.as_millis() as u64, "initial load timed out; continuing");
        }

        {
            let mut state = self.lock();
            if !state.accepts(epoch) {
                debug!(epoch, "session ended during initial load");
                return;
            }
            state.lifecycle = LifecycleState::Ready;
            state.initialized = true;
        }
        info!(epoch, "request views ready");
        self.subscribe_for(epoch).await;
    }

    /// Run `fetch_all(filter)` and `fetch_mine` as separate tasks and wait
    /// up to `timeout` for both. The tasks are not aborted on timeout.
    async fn run_concurrently(&self, filter: RequestFilter, timeout: Duration) -> bool {
        let all = {
            let engine = self.clone();
            tokio::spawn(async move { engine.fetch_all(filter).await })
        };
        let mine = {
            let engine = self.clone();
            tokio::spawn(async move { engine.fetch_mine().await })
        };

        tokio::time::timeout(timeout, async {
            let (all, mine) = tokio::join!(all, mine);
            debug!(?all, ?mine, "concurrent fetches finished");
        })
        .await
        .is_ok()
    }

    /// Re-fetch `requests` (with the last filter) and `my_requests`.
    ///
    /// Only runs from `Ready`, and always returns to `Ready` afterwards, even
    /// when the caller stops waiting: the refresh itself runs on its own task.
    pub async fn refresh_requests(&self) -> RefreshOutcome {
        let (epoch, filter) = {
            let mut state = self.lock();
            if state.lifecycle != LifecycleState::Ready {
                debug!(lifecycle = ?state.lifecycle, "refresh skipped");
                return RefreshOutcome::Skipped;
            }
            state.lifecycle = LifecycleState::Refreshing;
            state.error = None;
            (state.epoch, state.last_filter.clone())
        };

        let engine = self.clone();
        let refresh = tokio::spawn(async move {
            let timeout = engine.config().refresh_timeout();
            let completed = engine.run_concurrently(filter, timeout).await;
            engine.finish_refresh(epoch);
            if completed {
                RefreshOutcome::Completed
            } else {
                warn!(timeout_ms = timeout.as_millis() as u64, "refresh timed out");
                RefreshOutcome::TimedOut
            }
        });

        match refresh.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "refresh task failed");
                self.finish_refresh(epoch);
                RefreshOutcome::TimedOut
            }
        }
    }

    fn finish_refresh(&self, epoch: u64) {
        let mut state = self.lock();
        if state.accepts(epoch) && state.lifecycle == LifecycleState::Refreshing {
            state.lifecycle = LifecycleState::Ready;
        }
    }

    /// Stop for good: the identity watcher and change feed are closed and
    /// every later fetch result is discarded. Views keep their last
    /// contents. Idempotent.
    pub async fn teardown(&self) {
        {
            let mut state = self.lock();
            if state.is_torn_down() {
                return;
            }
            state.lifecycle = LifecycleState::TornDown;
            state.epoch += 1;
            state.nearby_in_flight = 0;
        }

        let watcher = self.watcher().take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        self.unsubscribe().await;
        info!("request engine torn down");
    }
}
