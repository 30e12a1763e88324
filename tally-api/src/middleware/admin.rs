//! Admin Bearer Authentication
//!
//! Every `/api/admin/*` request must carry `Authorization: Bearer <token>`
//! matching the configured root token. An unset token fails closed.

use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::sync::Arc;
use tally_core::ConfigError;

type HmacSha256 = Hmac<Sha256>;

const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Verifier for the admin bearer token.
///
/// Only a MAC of the configured token is kept. Presented tokens are MAC'd
/// with the same key and compared with `verify_slice`, which runs in
/// constant time and hides the token length.
#[derive(Clone)]
pub struct AdminAuth {
    verifier: Option<Arc<TokenVerifier>>,
}

struct TokenVerifier {
    key: SecretString,
    expected: Vec<u8>,
}

impl AdminAuth {
    pub fn new(root_token: &SecretString) -> Result<Self, ConfigError> {
        let token = root_token.expose_secret().trim();
        if token.is_empty() {
            tracing::warn!("No admin token configured; all admin requests will be rejected");
            return Ok(Self { verifier: None });
        }

        let key = SecretString::from(token.to_string());
        let expected = mac_for(&key, token)?.finalize().into_bytes().to_vec();
        Ok(Self {
            verifier: Some(Arc::new(TokenVerifier { key, expected })),
        })
    }

    /// An auth gate that rejects everything.
    pub fn disabled() -> Self {
        Self { verifier: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.verifier.is_some()
    }

    /// Check a raw `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> Result<(), ApiError> {
        let verifier = self.verifier.as_ref().ok_or_else(ApiError::unauthorized)?;

        let presented = header
            .and_then(|h| h.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(ApiError::unauthorized)?;

        let mac = mac_for(&verifier.key, presented).map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize admin token MAC");
            ApiError::unauthorized()
        })?;
        mac.verify_slice(&verifier.expected)
            .map_err(|_| ApiError::unauthorized())
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn mac_for(key: &SecretString, token: &str) -> Result<HmacSha256, ConfigError> {
    let mut mac = HmacSha256::new_from_slice(key.expose_secret().as_bytes()).map_err(|e| {
        ConfigError::InvalidValue {
            field: "root_token".to_string(),
            value: "[REDACTED]".to_string(),
            reason: e.to_string(),
        }
    })?;
    mac.update(token.as_bytes());
    Ok(mac)
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Reject the request with 401 unless it carries the admin bearer token.
pub async fn admin_auth_middleware(
    State(auth): State<AdminAuth>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Err(err) = auth.verify(header) {
        tracing::debug!(path = %request.uri().path(), "Admin request rejected");
        return Err(err);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn auth(token: &str) -> AdminAuth {
        AdminAuth::new(&SecretString::from(token.to_string())).unwrap()
    }

    #[test]
    fn test_verify_accepts_exact_token() {
        let auth = auth("s3cret");
        assert!(auth.verify(Some("Bearer s3cret")).is_ok());
        assert!(auth.verify(Some("Bearer   s3cret  ")).is_ok());
    }

    #[test]
    fn test_verify_rejects_bad_headers() {
        let auth = auth("s3cret");
        assert!(auth.verify(None).is_err());
        assert!(auth.verify(Some("s3cret")).is_err());
        assert!(auth.verify(Some("Basic s3cret")).is_err());
        assert!(auth.verify(Some("Bearer ")).is_err());
        assert!(auth.verify(Some("Bearer s3cre")).is_err());
        assert!(auth.verify(Some("Bearer s3cret2")).is_err());
    }

    #[test]
    fn test_unconfigured_fails_closed() {
        let auth = auth("   ");
        assert!(!auth.is_enabled());
        assert!(auth.verify(Some("Bearer ")).is_err());
        assert!(auth.verify(Some("Bearer anything")).is_err());
        assert!(AdminAuth::disabled().verify(Some("Bearer x")).is_err());
    }

    #[test]
    fn test_configured_token_is_trimmed() {
        let auth = auth("  s3cret\n");
        assert!(auth.verify(Some("Bearer s3cret")).is_ok());
    }

    #[tokio::test]
    async fn test_middleware_returns_unauthorized_body() -> Result<(), String> {
        let app = Router::new()
            .route("/admin/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(auth("s3cret"), admin_auth_middleware));

        let request = Request::builder()
            .uri("/admin/ping")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| format!("Failed to read body: {:?}", e))?;
        let json: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        assert_eq!(json["error"], "unauthorized");

        let request = Request::builder()
            .uri("/admin/ping")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .map_err(|e| e.to_string())?;
        let response = app
            .oneshot(request)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }
}
