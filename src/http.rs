//! HTTP read surface over a running engine.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `GET /health` - lifecycle, user and subscription status.
//! - `GET /requests`, `GET /requests/mine`, `GET /requests/nearby` - view snapshots.
//! - `GET /requests/by-id/:id` - one request from any view, 404 when absent.
//! - `GET /search?q=...&status=...&category_id=...` - ad hoc search.
//! - `POST /refresh` - manual refresh; returns the outcome.
//!
//! ## Example
//!
//! ```ignore
//! use neighbor_sync::{http, RequestEngine};
//! use neighbor_sync::store::InMemoryRequestStore;
//!
//! let engine = RequestEngine::new(InMemoryRequestStore::new());
//!
//! // Get the router to compose with other axum routes
//! let app = http::router(engine.clone());
//!
//! // Or serve directly
//! http::serve(engine, "0.0.0.0:3000").await?;
//! ```

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::engine::{EngineError, RequestEngine};
use crate::filter::RequestFilter;
use crate::request::RequestStatus;

/// Build an axum `Router` that reads from the given engine.
pub fn router(engine: RequestEngine) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/requests", get(requests_handler))
        .route("/requests/mine", get(my_requests_handler))
        .route("/requests/nearby", get(nearby_handler))
        .route("/requests/by-id/:id", get(by_id_handler))
        .route("/search", get(search_handler))
        .route("/refresh", post(refresh_handler))
        .with_state(engine)
}

/// Serve the engine over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve(engine: RequestEngine, addr: &str) -> Result<(), std::io::Error> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn error_response(err: &EngineError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn health_handler(State(engine): State<RequestEngine>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "lifecycle": engine.lifecycle(),
        "user": engine.current_user(),
        "subscribed": engine.is_subscribed(),
        "error": engine.error(),
        "realtime": engine.realtime_stats(),
    }))
}

async fn requests_handler(State(engine): State<RequestEngine>) -> impl IntoResponse {
    Json(engine.requests())
}

async fn my_requests_handler(State(engine): State<RequestEngine>) -> impl IntoResponse {
    Json(engine.my_requests())
}

async fn nearby_handler(State(engine): State<RequestEngine>) -> impl IntoResponse {
    Json(engine.nearby_requests())
}

async fn by_id_handler(
    State(engine): State<RequestEngine>,
    Path(id): Path<String>,
) -> Response {
    match engine.get_request_by_id(&id) {
        Some(request) => Json(request).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("request not found: {}", id) })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    status: Option<RequestStatus>,
    category_id: Option<String>,
}

async fn search_handler(
    State(engine): State<RequestEngine>,
    Query(params): Query<SearchParams>,
) -> Response {
    let mut filter = RequestFilter::new();
    filter.status = params.status;
    filter.category_id = params.category_id;

    match engine.search(&params.q, filter).await {
        Ok(found) => Json(found).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn refresh_handler(State(engine): State<RequestEngine>) -> impl IntoResponse {
    let outcome = engine.refresh_requests().await;
    Json(json!({ "outcome": outcome }))
}
