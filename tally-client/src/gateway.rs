//! Admin Gateway
//!
//! Forwards `/admin/*` to the backend with the root bearer token attached,
//! so browsers never hold the credential. One attempt per request; the
//! upstream status and body are relayed unchanged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tally_core::ConfigError;
use tower_http::trace::TraceLayer;

pub const DEFAULT_GATEWAY_BIND_ADDR: &str = "0.0.0.0:3000";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend API root, e.g. `http://localhost:8080/api`.
    pub backend_url: String,

    pub root_token: SecretString,

    pub bind_addr: SocketAddr,

    /// Upper bound on one forwarded request.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(backend_url: impl Into<String>, root_token: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            root_token: SecretString::from(root_token.into()),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            timeout: Duration::from_secs(30),
        }
    }

    /// Environment variables:
    /// - `TALLY_BACKEND_URL` or `NEXT_PUBLIC_BACKEND_URL`: backend API root (required)
    /// - `ROOT_TOKEN`: bearer token injected into every request (required)
    /// - `TALLY_GATEWAY_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
    /// - `TALLY_GATEWAY_TIMEOUT_SECS`: upstream timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = value("TALLY_BACKEND_URL")
            .or_else(|| value("NEXT_PUBLIC_BACKEND_URL"))
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "TALLY_BACKEND_URL".to_string(),
            })?;
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_BACKEND_URL".to_string(),
                value: backend_url,
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let root_token = value("ROOT_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            field: "ROOT_TOKEN".to_string(),
        })?;

        let mut config = Self::new(backend_url, root_token);
        if let Some(raw) = value("TALLY_GATEWAY_BIND_ADDR") {
            config.bind_addr = raw.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue {
                    field: "TALLY_GATEWAY_BIND_ADDR".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = value("TALLY_GATEWAY_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    field: "TALLY_GATEWAY_TIMEOUT_SECS".to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

// ============================================================================
// PROXY
// ============================================================================

struct GatewayState {
    http: reqwest::Client,
    backend_url: String,
    root_token: SecretString,
}

/// Backend URL for an incoming `/admin/...` request, query included.
fn upstream_url(backend_url: &str, uri: &Uri) -> String {
    match uri.query() {
        Some(query) => format!("{}{}?{}", backend_url, uri.path(), query),
        None => format!("{}{}", backend_url, uri.path()),
    }
}

fn forwarded_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = incoming.clone();
    // Caller connection and credential headers never reach the backend.
    // Bodies are relayed without content-encoding, so the backend must not
    // compress them.
    for name in [
        header::ACCEPT_ENCODING,
        header::HOST,
        header::AUTHORIZATION,
        header::CONTENT_LENGTH,
        header::CONNECTION,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

async fn proxy(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = upstream_url(&state.backend_url, &uri);

    let mut request = state
        .http
        .request(method.clone(), &url)
        .headers(forwarded_headers(&headers))
        .bearer_auth(state.root_token.expose_secret());
    if method != Method::GET && method != Method::HEAD && !body.is_empty() {
        request = request.body(body);
    }

    let upstream = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, %method, path = uri.path(), "Admin proxy request failed");
            return internal_error();
        }
    };

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    match upstream.bytes().await {
        Ok(bytes) => {
            tracing::debug!(%method, path = uri.path(), status = status.as_u16(), "Proxied admin request");
            (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, %method, path = uri.path(), "Failed to read upstream body");
            internal_error()
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Gateway is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `ANY /admin/*` proxied upstream, plus `GET /health`.
pub fn create_gateway_router(config: &GatewayConfig) -> Result<Router, ConfigError> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "http_client".to_string(),
            value: config.backend_url.clone(),
            reason: e.to_string(),
        })?;

    let state = Arc::new(GatewayState {
        http,
        backend_url: config.backend_url.trim_end_matches('/').to_string(),
        root_token: config.root_token.clone(),
    });

    Ok(Router::new()
        .route("/admin", any(proxy))
        .route("/admin/*rest", any(proxy))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_accepts_legacy_backend_variable() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("NEXT_PUBLIC_BACKEND_URL", "http://backend:8080/api/"),
            ("ROOT_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.backend_url, "http://backend:8080/api");
        assert_eq!(config.root_token.expose_secret(), "secret");
        assert_eq!(config.bind_addr, DEFAULT_GATEWAY_BIND_ADDR.parse().unwrap());

        let preferred = GatewayConfig::from_lookup(lookup(&[
            ("TALLY_BACKEND_URL", "https://api.example/api"),
            ("NEXT_PUBLIC_BACKEND_URL", "http://backend:8080/api"),
            ("ROOT_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(preferred.backend_url, "https://api.example/api");
    }

    #[test]
    fn test_config_requires_backend_and_token() {
        let err = GatewayConfig::from_lookup(lookup(&[("ROOT_TOKEN", "secret")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { field } if field == "TALLY_BACKEND_URL"));

        let err = GatewayConfig::from_lookup(lookup(&[
            ("TALLY_BACKEND_URL", "http://backend"),
            ("ROOT_TOKEN", "  "),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { field } if field == "ROOT_TOKEN"));

        let err = GatewayConfig::from_lookup(lookup(&[
            ("TALLY_BACKEND_URL", "backend:8080"),
            ("ROOT_TOKEN", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let uri: Uri = "/admin/submissions?surveyId=abc&limit=5".parse().unwrap();
        assert_eq!(
            upstream_url("http://backend/api", &uri),
            "http://backend/api/admin/submissions?surveyId=abc&limit=5"
        );
        let uri: Uri = "/admin/surveys".parse().unwrap();
        assert_eq!(upstream_url("http://backend/api", &uri), "http://backend/api/admin/surveys");
    }

    #[test]
    fn test_caller_credentials_and_hop_headers_are_dropped() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        incoming.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer forged"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        incoming.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        incoming.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        incoming.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        incoming.insert("x-request-id", HeaderValue::from_static("abc"));

        let forwarded = forwarded_headers(&incoming);
        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
        assert!(forwarded.contains_key("x-request-id"));
    }
}
