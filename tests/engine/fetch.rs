//! Fetch orchestration: filters, freshness, failures.

use std::time::Duration;

use neighbor_sync::{
    EngineError, FetchOutcome, FixedLocation, LocationError, RequestFilter, RequestStatus,
};

use crate::support::{self, ALICE, HOME, ME};

#[tokio::test]
async fn requests_leave_out_my_own() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let requests = engine.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.user_id != ME));
}

#[tokio::test]
async fn owner_filter_keeps_own_requests() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let outcome = engine.fetch_all(RequestFilter::new().with_owner(ME)).await;
    assert_eq!(outcome, FetchOutcome::Applied { len: 2 });
    assert!(engine.requests().iter().all(|r| r.user_id == ME));
}

#[tokio::test]
async fn equality_filters_narrow_requests() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    engine.fetch_all(RequestFilter::new().with_category("pets")).await;
    assert_eq!(support::titles(&engine.requests()), vec!["Walk dog"]);

    engine
        .fetch_all(RequestFilter::new().with_status(RequestStatus::Completed))
        .await;
    assert!(engine.requests().is_empty());
}

#[tokio::test]
async fn radius_filter_sorts_by_distance_and_drops_missing_coordinates() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let filter = RequestFilter::new().within(HOME.0, HOME.1, 3.0);
    engine.fetch_all(filter).await;

    let requests = engine.requests();
    assert_eq!(support::titles(&requests), vec!["Carry groceries", "Fix sink"]);
    let distances: Vec<f64> = requests.iter().map(|r| r.distance_km.unwrap()).collect();
    assert!(distances.iter().all(|d| *d <= 3.0));
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert!(requests.iter().all(|r| r.coordinates().is_some()));
}

#[tokio::test]
async fn failed_fetch_keeps_the_previous_view() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let before = engine.requests();

    store.set_query_failure(Some("connection reset"));
    let outcome = engine.fetch_all(RequestFilter::default()).await;

    assert!(matches!(outcome, FetchOutcome::Failed(EngineError::Store(_))));
    assert_eq!(engine.requests(), before);
    assert_eq!(engine.error().as_deref(), Some("store unavailable: connection reset"));

    store.set_query_failure(None);
    engine.fetch_all(RequestFilter::default()).await;
    assert!(engine.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn older_fetch_landing_late_is_superseded() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let before = store.queries_started();

    store.set_query_delay(Some(Duration::from_millis(200)));
    let slow = support::spawn({
        let engine = engine.clone();
        async move { engine.fetch_all(RequestFilter::default()).await }
    });
    support::queries_started(&store, before + 1).await;
    store.set_query_delay(None);

    let fast = engine.fetch_all(RequestFilter::new().with_category("plumbing")).await;
    assert_eq!(fast, FetchOutcome::Applied { len: 1 });

    assert_eq!(slow.await.unwrap(), FetchOutcome::Superseded);
    assert_eq!(support::titles(&engine.requests()), vec!["Fix sink"]);
}

#[tokio::test]
async fn fetches_without_a_user_are_skipped() {
    let store = support::seeded();
    let engine = support::engine(&store);

    assert_eq!(engine.fetch_all(RequestFilter::default()).await, FetchOutcome::Skipped);
    assert_eq!(engine.fetch_mine().await, FetchOutcome::Skipped);
    assert_eq!(engine.fetch_nearby(HOME.0, HOME.1, 10.0).await, FetchOutcome::Skipped);
    assert_eq!(store.queries_started(), 0);
}

#[tokio::test]
async fn nearby_holds_other_users_open_requests_in_range() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let outcome = engine.fetch_nearby(HOME.0, HOME.1, 10.0).await;
    assert_eq!(outcome, FetchOutcome::Applied { len: 3 });

    let nearby = engine.nearby_requests();
    assert_eq!(
        support::titles(&nearby),
        vec!["Carry groceries", "Fix sink", "Walk dog"]
    );
    assert!(nearby.iter().all(|r| r.status == RequestStatus::Open));
    assert!(nearby.iter().all(|r| r.user_id != ME));
    assert!(nearby.iter().all(|r| r.distance_km.unwrap() <= 10.0));
    assert!(!engine.is_loading_nearby());
}

#[tokio::test]
async fn nearby_rejects_bad_input() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    assert!(matches!(
        engine.fetch_nearby(91.0, 0.0, 10.0).await,
        FetchOutcome::Failed(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.fetch_nearby(HOME.0, HOME.1, -1.0).await,
        FetchOutcome::Failed(EngineError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.fetch_nearby(HOME.0, HOME.1, f64::NAN).await,
        FetchOutcome::Failed(EngineError::InvalidInput(_))
    ));
    assert!(matches!(engine.last_error(), Some(EngineError::InvalidInput(_))));
    assert!(engine.error().unwrap().contains("radius"));
}

#[tokio::test]
async fn requests_radius_is_checked_before_querying() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let before = engine.requests();
    let queries = store.queries_started();

    let outcome = engine
        .fetch_all(RequestFilter::new().within(HOME.0, HOME.1, f64::NAN))
        .await;
    assert!(matches!(outcome, FetchOutcome::Failed(EngineError::InvalidInput(_))));

    let outcome = engine
        .fetch_all(RequestFilter::new().within(-95.0, HOME.1, 10.0))
        .await;
    assert!(matches!(outcome, FetchOutcome::Failed(EngineError::InvalidInput(_))));

    assert!(matches!(engine.last_error(), Some(EngineError::InvalidInput(_))));
    assert_eq!(store.queries_started(), queries);
    assert_eq!(engine.requests(), before);

    // the rejected filter is not remembered for refresh
    engine.refresh_requests().await;
    assert_eq!(engine.requests(), before);
}

#[tokio::test(start_paused = true)]
async fn abandoned_nearby_fetch_stops_loading() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    store.set_query_delay(Some(Duration::from_secs(2)));
    let gave_up =
        tokio::time::timeout(Duration::from_millis(100), engine.fetch_nearby(HOME.0, HOME.1, 10.0)).await;
    assert!(gave_up.is_err());

    assert!(!engine.is_loading_nearby());
    assert!(!engine.snapshot().is_loading_nearby);
    assert!(engine.nearby_requests().is_empty());

    store.set_query_delay(None);
    assert!(engine.fetch_nearby(HOME.0, HOME.1, 10.0).await.is_applied());
    assert!(!engine.is_loading_nearby());
}

#[tokio::test(start_paused = true)]
async fn loading_nearby_while_in_flight() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let before = store.queries_started();

    store.set_query_delay(Some(Duration::from_millis(100)));
    let pending = support::spawn({
        let engine = engine.clone();
        async move { engine.fetch_nearby(HOME.0, HOME.1, 10.0).await }
    });
    support::queries_started(&store, before + 1).await;
    assert!(engine.is_loading_nearby());

    assert!(pending.await.unwrap().is_applied());
    assert!(!engine.is_loading_nearby());
}

#[tokio::test]
async fn nearby_from_device_uses_default_radius() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let outcome = engine
        .fetch_nearby_from(&FixedLocation::at(HOME.0, HOME.1), None)
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Applied { len: 3 });

    let outcome = engine
        .fetch_nearby_from(&FixedLocation::at(HOME.0, HOME.1), Some(1.0))
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Applied { len: 1 });
}

#[tokio::test]
async fn nearby_from_device_reports_denied_permission() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let err = engine
        .fetch_nearby_from(&FixedLocation::denied(), None)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Location(LocationError::PermissionDenied));
    assert_eq!(engine.last_error(), Some(err));
    assert!(engine.nearby_requests().is_empty());
}

#[tokio::test]
async fn search_matches_title_location_or_category() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let found = engine.search("GROCER", RequestFilter::default()).await.unwrap();
    // includes my own "Water my plants", matched by category
    assert_eq!(found.len(), 3);
    for request in &found {
        let haystack = format!(
            "{} {} {}",
            request.title, request.location, request.category.name
        )
        .to_lowercase();
        assert!(haystack.contains("grocer"));
    }

    let found = engine.search("village", RequestFilter::default()).await.unwrap();
    assert_eq!(support::titles(&found), vec!["Fix sink"]);
}

#[tokio::test]
async fn search_does_not_touch_views() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let before = engine.requests();

    let found = engine
        .search("", RequestFilter::new().with_owner(ALICE))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(engine.requests(), before);
}

#[tokio::test]
async fn search_failure_is_returned_and_recorded() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    store.set_query_failure(Some("offline"));
    let err = engine.search("sink", RequestFilter::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert!(engine.error().is_some());
}

#[tokio::test]
async fn search_without_user_is_empty() {
    let store = support::seeded();
    let engine = support::engine(&store);

    let found = engine.search("sink", RequestFilter::default()).await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn lookup_by_id_checks_every_view() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;

    let mine = engine.my_requests()[0].clone();
    let theirs = engine.requests()[0].clone();
    assert_eq!(engine.get_request_by_id(&mine.id), Some(mine));
    assert_eq!(engine.get_request_by_id(&theirs.id), Some(theirs));
    assert_eq!(engine.get_request_by_id("missing"), None);
}
