//! Health Check Endpoint
//!
//! `GET /api/health` answers `{"status": "ok"}` while the process serves
//! requests. No authentication required.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /api/health - Liveness check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse),
    ),
)]
pub async fn health(State(start_time): State<Instant>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(health))
}
