//! Realtime reconciliation: one change-feed subscription per engine, with
//! re-fetches coalesced so a burst of events costs one trailing round.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EngineError, EngineInner, RequestEngine};
use crate::store::{ChangeEvent, StoreError, SubscriptionId};

/// Pending-flag plus trailing-edge scheduler.
///
/// `trigger` marks a round pending and wakes the worker unless a round is
/// already pending, in which case the event is absorbed into it. The worker
/// clears the flag *before* it starts fetching, so an event that lands
/// mid-round schedules exactly one more round afterwards.
pub(crate) struct Coalescer {
    pending: AtomicBool,
    notify: Notify,
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Returns false if the event was absorbed into an already pending round.
    pub fn trigger(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next pending round and claim it.
    pub async fn next_round(&self) {
        self.notify.notified().await;
        self.pending.store(false, Ordering::Release);
    }
}

/// Counters for the change feed, cumulative over the engine's life.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RealtimeStats {
    /// Change events received.
    pub events: usize,
    /// Re-fetch rounds run.
    pub refetches: usize,
    /// Events folded into an already pending round.
    pub absorbed: usize,
}

#[derive(Default)]
pub(crate) struct RealtimeCounters {
    events: AtomicUsize,
    refetches: AtomicUsize,
    absorbed: AtomicUsize,
}

impl RealtimeCounters {
    pub fn snapshot(&self) -> RealtimeStats {
        RealtimeStats {
            events: self.events.load(Ordering::SeqCst),
            refetches: self.refetches.load(Ordering::SeqCst),
            absorbed: self.absorbed.load(Ordering::SeqCst),
        }
    }
}

/// The open feed and the two tasks serving it.
pub(crate) struct ActiveSubscription {
    id: SubscriptionId,
    /// Session the feed was opened for.
    epoch: u64,
    listener: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(&self) {
        self.listener.abort();
        self.worker.abort();
    }
}

impl RequestEngine {
    /// Open the change feed for the current session. No-op when already
    /// subscribed or nobody is signed in.
    ///
    /// Returns whether a subscription is active afterwards. A failure to
    /// subscribe is recorded and leaves the engine in pull-only mode.
    pub async fn subscribe(&self) -> bool {
        let epoch = self.lock().epoch;
        self.subscribe_for(epoch).await
    }

    pub(crate) async fn subscribe_for(&self, epoch: u64) -> bool {
        let mut slot = self.inner.subscription.lock().await;
        {
            let state = self.lock();
            if !state.accepts(epoch) || state.user.is_none() {
                return false;
            }
        }
        match slot.as_ref() {
            Some(active) if active.epoch == epoch => return true,
            // left over from an earlier session
            Some(_) => {
                if let Some(stale) = slot.take() {
                    self.close(stale).await;
                }
            }
            None => {}
        }

        let collection = self.config().collection();
        let subscription = match self.store().subscribe_to_changes(collection).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(error = %err, "realtime subscription failed; continuing pull-only");
                self.record_error(epoch, &EngineError::from(err));
                return false;
            }
        };

        // the session may have ended while we were connecting
        if !self.lock().accepts(epoch) {
            if let Err(err) = self.store().unsubscribe(subscription.id).await {
                warn!(error = %err, "failed to close stale subscription");
            }
            return false;
        }

        let id = subscription.id;
        let coalescer = Arc::new(Coalescer::new());
        let listener = tokio::spawn(listen(
            Arc::downgrade(&self.inner),
            id,
            subscription.events,
            Arc::clone(&coalescer),
        ));
        let worker = tokio::spawn(refetch_rounds(Arc::downgrade(&self.inner), coalescer));

        *slot = Some(ActiveSubscription {
            id,
            epoch,
            listener,
            worker,
        });
        self.lock().subscription = Some(id);
        info!(subscription = %id, collection, "subscribed to request changes");
        true
    }

    /// Close the change feed. No-op when not subscribed.
    pub async fn unsubscribe(&self) {
        let active = self.inner.subscription.lock().await.take();
        if let Some(active) = active {
            self.close(active).await;
        }
    }

    /// Close the feed only if it belongs to a session older than `epoch`.
    /// A feed the next session already opened is left alone.
    pub(crate) async fn unsubscribe_before(&self, epoch: u64) {
        let active = {
            let mut slot = self.inner.subscription.lock().await;
            match slot.as_ref() {
                Some(active) if active.epoch < epoch => slot.take(),
                _ => None,
            }
        };
        if let Some(active) = active {
            self.close(active).await;
        }
    }

    async fn close(&self, active: ActiveSubscription) {
        active.stop();
        {
            let mut state = self.lock();
            if state.subscription == Some(active.id) {
                state.subscription = None;
            }
        }
        if let Err(err) = self.store().unsubscribe(active.id).await {
            warn!(subscription = %active.id, error = %err, "unsubscribe failed");
        }
        info!(subscription = %active.id, "unsubscribed from request changes");
    }

    /// The store closed the feed under us. Forget it so `subscribe` can
    /// open a new one, and fall back to pull-only.
    async fn feed_closed(&self, id: SubscriptionId) {
        let mut slot = self.inner.subscription.lock().await;
        if slot.as_ref().map(|active| active.id) != Some(id) {
            return;
        }
        if let Some(active) = slot.take() {
            active.worker.abort();
        }

        let epoch = {
            let mut state = self.lock();
            state.subscription = None;
            state.epoch
        };
        warn!(subscription = %id, "change feed closed; continuing pull-only");
        self.record_error(
            epoch,
            &EngineError::Store(StoreError::Subscription("change feed closed".into())),
        );
    }
}

async fn listen(
    engine: Weak<EngineInner>,
    id: SubscriptionId,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    coalescer: Arc<Coalescer>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = engine.upgrade() else {
            return;
        };
        inner.realtime.events.fetch_add(1, Ordering::SeqCst);
        debug!(kind = ?event.kind, record_id = %event.record_id, "request change received");

        if !coalescer.trigger() {
            inner.realtime.absorbed.fetch_add(1, Ordering::SeqCst);
        }
    }

    if let Some(inner) = engine.upgrade() {
        RequestEngine::from_inner(inner).feed_closed(id).await;
    }
}

/// Re-fetch `requests` and `my_requests` once per coalesced round.
/// `nearby_requests` only changes on explicit fetches.
async fn refetch_rounds(engine: Weak<EngineInner>, coalescer: Arc<Coalescer>) {
    loop {
        coalescer.next_round().await;
        let Some(inner) = engine.upgrade() else {
            return;
        };
        let engine = RequestEngine::from_inner(inner);
        engine.inner.realtime.refetches.fetch_add(1, Ordering::SeqCst);

        let filter = engine.lock().last_filter.clone();
        let (all, mine) = tokio::join!(engine.fetch_all(filter), engine.fetch_mine());
        debug!(?all, ?mine, "realtime refetch finished");
    }
}
