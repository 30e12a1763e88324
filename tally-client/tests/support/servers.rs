//! Live servers on loopback ports for the client and gateway tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tally_api::jobs::InsightQueue;
use tally_api::{create_api_router, AdminAuth, ApiConfig, AppState, InsightWorker, WorkerConfig};
use tally_client::{ClientConfig, TallyClient};
use tally_storage::{InMemoryStore, Store};
use tally_test_utils::ScriptedSummarizer;
use tokio::sync::watch;

pub const ADMIN_TOKEN: &str = "client-root-token";

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn spawn(router: Router) -> Result<String, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("bind: {}", e))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("local addr: {}", e))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("test server stopped: {}", e);
        }
    });
    Ok(format!("http://{}", addr))
}

/// A URL nothing listens on.
pub async fn dead_url() -> Result<String, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("bind: {}", e))?;
    let addr = listener
        .local_addr()
        .map_err(|e| format!("local addr: {}", e))?;
    drop(listener);
    Ok(format!("http://{}", addr))
}

pub struct ApiServer {
    /// API root, ending in `/api`.
    pub url: String,
    pub store: Arc<dyn Store>,
    shutdown: watch::Sender<bool>,
}

impl ApiServer {
    pub fn admin_client(&self) -> Result<TallyClient, String> {
        TallyClient::new(ClientConfig::new(&self.url).with_admin_token(ADMIN_TOKEN))
            .map_err(|e| e.to_string())
    }

    pub fn public_client(&self) -> Result<TallyClient, String> {
        TallyClient::new(ClientConfig::new(&self.url)).map_err(|e| e.to_string())
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// The real API over an in-memory store, with a worker summarizing through
/// `scripted`.
pub async fn spawn_api(scripted: &ScriptedSummarizer) -> Result<ApiServer, String> {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let (queue, jobs) = InsightQueue::channel(64);
    let worker = InsightWorker::new(
        Arc::clone(&store),
        scripted.summarizer.clone(),
        queue.clone(),
        WorkerConfig::development(),
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(worker.run(jobs, shutdown_rx));

    let admin = AdminAuth::new(&SecretString::from(ADMIN_TOKEN.to_string()))
        .map_err(|e| format!("admin auth: {}", e))?;
    let state = AppState::new(Arc::clone(&store), queue, admin);
    let router = create_api_router(state, &ApiConfig::default())
        .map_err(|e| format!("router: {}", e.message))?;
    let root = spawn(router).await?;

    Ok(ApiServer {
        url: format!("{}/api", root),
        store,
        shutdown,
    })
}
