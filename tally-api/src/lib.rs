//! Tally API - REST Server and Insight Worker
//!
//! Axum routes for survey authoring, public submission and insight
//! requests, the admin bearer gate, a Postgres-backed store and the
//! background worker that turns insight requests into summaries.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{InsightQueue, InsightWorker, WorkerConfig};
pub use middleware::AdminAuth;
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
