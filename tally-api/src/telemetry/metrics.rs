//! Prometheus Metrics
//!
//! HTTP traffic, insight job outcomes and summarization calls, registered
//! once in the default registry and served as text at `/api/metrics`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Request latency buckets, 1ms to 10s.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Job latency buckets; one job waits on several completions.
const JOB_LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

pub static METRICS: Lazy<ApiResult<TallyMetrics>> = Lazy::new(TallyMetrics::register);

#[derive(Clone)]
pub struct TallyMetrics {
    /// Labels: method, normalized path, status
    pub http_requests_total: CounterVec,

    /// Labels: method, normalized path
    pub http_request_duration_seconds: HistogramVec,

    /// Labels: outcome (completed, failed, skipped, retried, abandoned)
    pub insight_jobs_total: CounterVec,

    /// Labels: outcome
    pub insight_job_duration_seconds: HistogramVec,

    /// Labels: kind (batch, meta), status (success, error)
    pub summaries_total: CounterVec,

    pub insight_jobs_in_flight: Gauge,
}

fn registered<T>(metric: &str, result: prometheus::Result<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::internal_error(format!("Failed to register {}: {}", metric, e)))
}

impl TallyMetrics {
    fn register() -> ApiResult<Self> {
        let http_requests_total = registered(
            "tally_http_requests_total",
            register_counter_vec!(
                "tally_http_requests_total",
                "HTTP requests served",
                &["method", "path", "status"]
            ),
        )?;
        let http_request_duration_seconds = registered(
            "tally_http_request_duration_seconds",
            register_histogram_vec!(
                "tally_http_request_duration_seconds",
                "HTTP request latency in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            ),
        )?;
        let insight_jobs_total = registered(
            "tally_insight_jobs_total",
            register_counter_vec!(
                "tally_insight_jobs_total",
                "Insight jobs handled by the worker",
                &["outcome"]
            ),
        )?;
        let insight_job_duration_seconds = registered(
            "tally_insight_job_duration_seconds",
            register_histogram_vec!(
                "tally_insight_job_duration_seconds",
                "Insight job latency in seconds",
                &["outcome"],
                JOB_LATENCY_BUCKETS.to_vec()
            ),
        )?;
        let summaries_total = registered(
            "tally_summaries_total",
            register_counter_vec!(
                "tally_summaries_total",
                "Summarization requests by kind and result",
                &["kind", "status"]
            ),
        )?;
        let insight_jobs_in_flight = registered(
            "tally_insight_jobs_in_flight",
            register_gauge!(
                "tally_insight_jobs_in_flight",
                "Insight jobs currently being processed"
            ),
        )?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            insight_jobs_total,
            insight_job_duration_seconds,
            summaries_total,
            insight_jobs_in_flight,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// One finished job attempt.
    pub fn record_insight_job(&self, outcome: &str, duration_secs: f64) {
        self.insight_jobs_total.with_label_values(&[outcome]).inc();
        self.insight_job_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_summary(&self, kind: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.summaries_total.with_label_values(&[kind, status]).inc();
    }

    pub fn job_started(&self) {
        self.insight_jobs_in_flight.inc();
    }

    pub fn job_finished(&self) {
        self.insight_jobs_in_flight.dec();
    }
}

/// Apply `f` to the global metrics. A no-op when registration failed.
pub fn with_metrics(f: impl FnOnce(&TallyMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// GET /api/metrics - Prometheus text exposition
#[utoipa::path(
    get,
    path = "/api/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
