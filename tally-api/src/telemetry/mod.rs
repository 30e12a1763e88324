//! Tally Telemetry - Observability Infrastructure
//!
//! Structured logging via `tracing` and Prometheus metrics for the API
//! layer and the insight worker.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, TallyMetrics, METRICS};
pub use middleware::{normalize_path, observability_middleware};
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
