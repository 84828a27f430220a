//! Health check handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;
use vona_rag::CacheStatsReport;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub index_documents: usize,
}

/// Readiness probe - ready once the index is bootstrapped
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index_documents = state.chat.index().len().await.unwrap_or(0);
    let ready = state.is_ready();

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            index_documents,
        }),
    )
}

/// Metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub index_documents: usize,
    pub orders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_cache: Option<CacheStatsReport>,
}

/// Runtime counters as JSON
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = state.uptime_secs();
    let total_requests = state.get_request_count();
    let requests_per_second = if uptime_secs > 0 {
        total_requests as f64 / uptime_secs as f64
    } else {
        0.0
    };

    Json(MetricsResponse {
        uptime_secs,
        total_requests,
        requests_per_second,
        index_documents: state.chat.index().len().await.unwrap_or(0),
        orders: state.chat.index().order_book().await.len(),
        embedding_cache: state.cache_stats.as_ref().map(|stats| stats.report()),
    })
}
