//! HTTP service exposing the guarded fetch endpoint.
//!
//! `GET /v1/fetch-safe?url=...` validates the URL, then fetches it through the
//! injected [`Fetcher`]. The unvalidated `GET /v1/fetch` route only exists in
//! test builds or with the `negative-control` feature.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::{Denial, FetchError};
use crate::fetch::{FetchRequest, Fetched, Fetcher};
use crate::validate::Validator;

/// Number of body characters returned to the caller.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub validator: Validator,
    pub fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    pub fn new(validator: Validator, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { validator, fetcher }
    }
}

/// Build the router with all routes.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/internal/secret", get(internal_secret))
        .route("/v1/fetch-safe", get(fetch_safe));

    #[cfg(any(test, feature = "negative-control"))]
    let router = router.route("/v1/fetch", get(fetch_unvalidated));

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, build_router(state)).await
}

#[derive(Debug, Deserialize)]
struct FetchQuery {
    url: String,
}

#[derive(Debug, Serialize)]
struct FetchResponse {
    status: u16,
    body: String,
}

impl From<Fetched> for FetchResponse {
    fn from(fetched: Fetched) -> Self {
        Self {
            status: fetched.status,
            body: fetched.truncated_body(BODY_PREVIEW_CHARS),
        }
    }
}

#[derive(Debug)]
enum ApiError {
    Denied(Denial),
    Upstream(FetchError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Denied(denial) => serde_json::json!({
                "detail": denial.to_string(),
                "reason": denial.code(),
            }),
            Self::Upstream(e) => serde_json::json!({
                "detail": format!("Request failed: {e}"),
            }),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Stand-in for an internal-only resource that must never be reachable
/// through the fetch endpoints.
async fn internal_secret() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "secret": "INTERNAL_ONLY_TOKEN=demo-secret" }))
}

async fn fetch_safe(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<FetchResponse>, ApiError> {
    let validated = state
        .validator
        .validate(&query.url)
        .await
        .map_err(ApiError::Denied)?;

    let fetched = state
        .fetcher
        .fetch(FetchRequest::pinned(&validated))
        .await
        .map_err(ApiError::Upstream)?;

    Ok(Json(fetched.into()))
}

#[cfg(any(test, feature = "negative-control"))]
async fn fetch_unvalidated(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<FetchResponse>, ApiError> {
    tracing::warn!(url = %query.url, "unvalidated fetch (negative control)");
    let fetched = state
        .fetcher
        .fetch(FetchRequest::unvalidated(query.url))
        .await
        .map_err(ApiError::Upstream)?;

    Ok(Json(fetched.into()))
}
