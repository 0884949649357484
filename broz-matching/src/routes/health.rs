//! Liveness/readiness probe and the Prometheus scrape endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;

use broz_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

/// `GET /health` — checks the database pool and Redis; degraded rather than
/// unhealthy if Redis alone is unreachable, since the core can still pair
/// and vote without it.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let mut checks = Vec::with_capacity(2);

    let db_check = match state.db.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => HealthCheck { name: "postgres".to_string(), status: HealthStatus::Healthy, message: None },
            Err(e) => HealthCheck { name: "postgres".to_string(), status: HealthStatus::Unhealthy, message: Some(e.to_string()) },
        },
        Err(e) => HealthCheck { name: "postgres".to_string(), status: HealthStatus::Unhealthy, message: Some(e.to_string()) },
    };
    checks.push(db_check);

    let redis_check = match state.redis.exists("health_check_probe").await {
        Ok(_) => HealthCheck { name: "redis".to_string(), status: HealthStatus::Healthy, message: None },
        Err(e) => HealthCheck { name: "redis".to_string(), status: HealthStatus::Degraded, message: Some(e.to_string()) },
    };
    checks.push(redis_check);

    let response = HealthResponse::healthy("broz-matching", env!("CARGO_PKG_VERSION")).with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// `GET /metrics` — Prometheus exposition format for the counters and
/// histograms recorded via the `metrics` facade throughout the engine.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
