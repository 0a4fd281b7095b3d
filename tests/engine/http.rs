//! HTTP read surface tests.
//!
//! Starts an axum server and exercises it with reqwest.

use neighbor_sync::{http, RequestEngine};
use serde_json::Value;

use crate::support::{self, HOME};

/// Bind to port 0 and return the actual address.
async fn start_server(engine: RequestEngine) -> String {
    let app = http::router(engine);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn get_json(client: &reqwest::Client, url: String) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_session_state() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let base = start_server(engine).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["ok"], true);
    assert_eq!(body["lifecycle"], "ready");
    assert_eq!(body["user"], support::ME);
    assert_eq!(body["subscribed"], true);
}

#[tokio::test]
async fn views_are_served_as_json() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    engine.fetch_nearby(HOME.0, HOME.1, 10.0).await;
    let base = start_server(engine.clone()).await;
    let client = reqwest::Client::new();

    let (_, requests) = get_json(&client, format!("{base}/requests")).await;
    assert_eq!(requests.as_array().unwrap().len(), 5);

    let (_, mine) = get_json(&client, format!("{base}/requests/mine")).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let (_, nearby) = get_json(&client, format!("{base}/requests/nearby")).await;
    let nearby = nearby.as_array().unwrap();
    assert_eq!(nearby.len(), 3);
    assert!(nearby[0]["distance_km"].as_f64().unwrap() < 1.0);
    assert_eq!(nearby[0]["status"], "open");

    let id = engine.my_requests()[0].id.clone();
    let (status, found) = get_json(&client, format!("{base}/requests/by-id/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(found["id"], id.as_str());

    let (status, missing) = get_json(&client, format!("{base}/requests/by-id/nope")).await;
    assert_eq!(status, 404);
    assert!(missing["error"].is_string());
}

#[tokio::test]
async fn search_route() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let base = start_server(engine).await;
    let client = reqwest::Client::new();

    let (status, found) = get_json(&client, format!("{base}/search?q=sink")).await;
    assert_eq!(status, 200);
    let found = found.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["title"], "Fix sink");

    let (_, found) = get_json(&client, format!("{base}/search?q=&category_id=pets")).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn search_after_teardown_is_unavailable() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    engine.teardown().await;
    let base = start_server(engine).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, format!("{base}/search?q=sink")).await;
    assert_eq!(status, 503);
    assert!(body["error"].as_str().unwrap().contains("torn down"));
}

#[tokio::test]
async fn refresh_route() {
    let store = support::seeded();
    let engine = support::ready_engine(&store).await;
    let base = start_server(engine).await;
    let client = reqwest::Client::new();

    let resp = client.post(format!("{base}/refresh")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["outcome"], "completed");

    let signed_out = support::engine(&store);
    let base = start_server(signed_out).await;
    let resp = client.post(format!("{base}/refresh")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["outcome"], "skipped");
}
