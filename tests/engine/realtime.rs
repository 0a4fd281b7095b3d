//! Change-feed reconciliation.

use std::collections::HashSet;

use neighbor_sync::{NewRequest, RequestPatch, RequestStatus};

use crate::support::{self, ALICE, BOB, HOME};

#[tokio::test]
async fn subscribe_is_idempotent() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    assert!(engine.subscribe().await);
    assert!(engine.subscribe().await);
    assert_eq!(store.subscriber_count(), 1);

    engine.unsubscribe().await;
    engine.unsubscribe().await;
    assert!(!engine.is_subscribed());
    assert_eq!(store.subscriber_count(), 0);
}

#[tokio::test]
async fn burst_of_changes_is_coalesced() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    for n in 0..10 {
        support::seed(
            &store,
            ALICE,
            NewRequest::new(format!("Odd job {n}"), "", "Midtown", "moving"),
        );
    }

    support::eventually(|| engine.requests().len() == 15).await;
    support::eventually(|| {
        let stats = engine.realtime_stats();
        stats.refetches + stats.absorbed == 10
    })
    .await;

    let stats = engine.realtime_stats();
    assert_eq!(stats.events, 10);
    assert!(stats.refetches < 10, "expected coalescing, got {stats:?}");

    let current = engine.requests();
    let ids: HashSet<&str> = current.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), 15);
}

#[tokio::test]
async fn updates_and_deletes_flow_into_views() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let target = engine.requests()[0].clone();

    engine
        .update_request(&target.id, RequestPatch::status(RequestStatus::Completed))
        .await
        .unwrap();
    support::eventually(|| {
        engine
            .get_request_by_id(&target.id)
            .map_or(false, |r| r.status == RequestStatus::Completed)
    })
    .await;

    engine.delete_request(&target.id).await.unwrap();
    support::eventually(|| engine.get_request_by_id(&target.id).is_none()).await;
    assert_eq!(engine.requests().len(), 4);
}

#[tokio::test]
async fn nearby_is_left_alone_by_change_events() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    engine.fetch_nearby(HOME.0, HOME.1, 10.0).await;
    let nearby = engine.nearby_requests();

    support::seed(
        &store,
        BOB,
        NewRequest::new("Jump start car", "Battery died", "Tribeca", "moving").at(40.7163, -74.0086),
    );

    support::eventually(|| engine.requests().len() == 6).await;
    assert_eq!(engine.nearby_requests(), nearby);
}

#[tokio::test]
async fn subscription_failure_falls_back_to_pull_only() {
    let store = support::seeded();
    store.set_subscribe_failure(Some("websocket refused"));
    let engine = support::ready_engine(&store).await;

    assert!(engine.is_initialized());
    assert!(!engine.is_subscribed());
    assert!(engine.error().unwrap().contains("websocket refused"));

    store.set_subscribe_failure(None);
    assert!(engine.subscribe().await);
    assert_eq!(store.subscriber_count(), 1);
}

#[tokio::test]
async fn closed_feed_is_recorded_and_can_be_reopened() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    store.close_change_feeds();
    support::eventually(|| !engine.is_subscribed()).await;
    assert!(engine.error().unwrap().contains("change feed closed"));

    assert!(engine.subscribe().await);
    support::seed(&store, ALICE, NewRequest::new("Feed cat", "", "Harlem", "pets"));
    support::eventually(|| engine.requests().len() == 6).await;
}

#[tokio::test]
async fn no_refetch_after_unsubscribe() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    engine.unsubscribe().await;
    let queries = store.queries_started();

    support::seed(&store, ALICE, NewRequest::new("Feed cat", "", "Harlem", "pets"));
    tokio::task::yield_now().await;

    assert_eq!(store.queries_started(), queries);
    assert_eq!(engine.requests().len(), 5);
    assert_eq!(engine.realtime_stats().events, 0);
}

#[tokio::test]
async fn sign_out_closes_the_feed() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    engine.set_user(None).await;
    support::seed(&store, ALICE, NewRequest::new("Feed cat", "", "Harlem", "pets"));
    tokio::task::yield_now().await;

    assert_eq!(store.subscriber_count(), 0);
    assert!(engine.requests().is_empty());
}
