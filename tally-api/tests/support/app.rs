//! Router harness shared by the API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::Value;
use tally_api::jobs::{InsightJob, InsightQueue};
use tally_api::{create_api_router, AdminAuth, ApiConfig, AppState};
use tally_storage::{InMemoryStore, Store};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "integration-root-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn Store>,
    pub queue: InsightQueue,
    pub jobs: mpsc::Receiver<InsightJob>,
}

pub fn test_app() -> Result<TestApp, String> {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (queue, jobs) = InsightQueue::channel(64);
    let admin = AdminAuth::new(&SecretString::from(ADMIN_TOKEN.to_string()))
        .map_err(|e| format!("admin auth: {}", e))?;
    let state = AppState::new(Arc::clone(&store), queue.clone(), admin);
    let router = create_api_router(state, &ApiConfig::default())
        .map_err(|e| format!("router: {}", e.message))?;
    Ok(TestApp {
        router,
        store,
        queue,
        jobs,
    })
}

/// Send a request; `admin` attaches the bearer token. Empty bodies decode
/// as `Value::Null`.
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    admin: bool,
) -> Result<(StatusCode, Value), String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if admin {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .map_err(|e| format!("request: {}", e))?;

    let response = router
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| format!("router: {}", e))?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("body: {}", e))?;
    if bytes.is_empty() {
        return Ok((status, Value::Null));
    }
    let json = serde_json::from_slice(&bytes).map_err(|e| format!("json: {}", e))?;
    Ok((status, json))
}

/// Decode the `data` field of an envelope.
pub fn data<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T, String> {
    serde_json::from_value(body["data"].clone()).map_err(|e| format!("decode data: {}", e))
}
