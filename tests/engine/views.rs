//! View-change notifications.

use std::sync::{Arc, Mutex};

use neighbor_sync::{ViewChange, ViewKind};

use crate::support::{self, ME};

fn recorder() -> (Arc<Mutex<Vec<ViewChange>>>, impl Fn(ViewChange) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |change| sink.lock().unwrap().push(change))
}

fn saw(seen: &Mutex<Vec<ViewChange>>, view: ViewKind, len: usize) -> bool {
    seen.lock()
        .unwrap()
        .iter()
        .any(|change| change.view == view && change.len == len)
}

#[tokio::test]
async fn applied_fetches_and_resets_are_announced() {
    let store = support::seeded();
    let engine = support::engine(&store);
    let (seen, listener) = recorder();
    engine.on_view_change(listener);

    engine.set_user(Some(ME.to_string())).await;
    support::eventually(|| saw(&seen, ViewKind::Requests, 5) && saw(&seen, ViewKind::MyRequests, 2)).await;

    engine.set_user(None).await;
    support::eventually(|| {
        saw(&seen, ViewKind::Requests, 0)
            && saw(&seen, ViewKind::MyRequests, 0)
            && saw(&seen, ViewKind::Nearby, 0)
    })
    .await;
}

#[tokio::test]
async fn removed_listeners_hear_nothing() {
    let store = support::seeded();
    let engine = support::engine(&store);
    let (seen, listener) = recorder();
    let id = engine.on_view_change(listener);

    assert!(engine.remove_view_listener(&id));
    assert!(!engine.remove_view_listener(&id));

    engine.set_user(Some(ME.to_string())).await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(seen.lock().unwrap().is_empty());
}
