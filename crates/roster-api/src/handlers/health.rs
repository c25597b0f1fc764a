//! Health check handlers

use crate::state::{AppState, EndpointMetrics};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
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
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub store: bool,
}

/// Readiness probe - checks the account store
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Store unreachable", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store_ready().await;
    let response = ReadinessResponse {
        ready: store,
        checks: ReadinessChecks { store },
    };

    if store {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub endpoints: BTreeMap<String, EndpointSummary>,
}

#[derive(Serialize)]
pub struct EndpointSummary {
    pub requests: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub avg_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl From<&EndpointMetrics> for EndpointSummary {
    fn from(metrics: &EndpointMetrics) -> Self {
        Self {
            requests: metrics.latency_count,
            status_counts: metrics.status_counts.clone(),
            avg_latency_us: metrics.average_latency_us(),
            min_latency_us: metrics.min_latency_us,
            max_latency_us: metrics.max_latency_us,
        }
    }
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    let endpoints = state
        .metrics
        .read()
        .await
        .iter()
        .map(|(endpoint, metrics)| (endpoint.clone(), EndpointSummary::from(metrics)))
        .collect();

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
        endpoints,
    })
}

/// Authenticated liveness check
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PingResponse {
    pub ok: bool,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/health/ping",
    tag = "health",
    responses(
        (status = 200, description = "Token accepted", body = PingResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        ok: true,
        version: "1.0".to_string(),
    })
}
