//! Request observability.
//!
//! Every request runs inside an `http_request` span keyed by its normalized
//! route; on completion it is counted, timed and logged.

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::with_metrics;

static UUID_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
});

// Public survey tokens are the only free-form path segment.
static SURVEY_TOKEN_PATTERN: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^/api/surveys/[^/]+$"));

/// Replace entity ids and survey tokens with `{id}` and `{token}` so label
/// values stay bounded.
pub fn normalize_path(path: &str) -> String {
    let mut result = path.to_string();
    if let Ok(pattern) = UUID_PATTERN.as_ref() {
        result = pattern.replace_all(&result, "{id}").into_owned();
    }
    if let Ok(pattern) = SURVEY_TOKEN_PATTERN.as_ref() {
        if pattern.is_match(&result) {
            result = "/api/surveys/{token}".to_string();
        }
    }
    result
}

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    with_metrics(|m| {
        m.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        )
    });

    // Survey tokens are not logged raw.
    tracing::info!(
        method = %method,
        path = %normalized_path,
        status = status.as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
