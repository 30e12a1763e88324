//! Tally API Server Entry Point
//!
//! Bootstraps configuration and storage, starts the insight worker and
//! serves the Axum router until Ctrl-C.

use std::sync::Arc;

use tally_api::jobs::InsightQueue;
use tally_api::telemetry::{init_tracing, TelemetryConfig};
use tally_api::{
    create_api_router, AdminAuth, ApiConfig, ApiError, ApiResult, AppState, DbConfig,
    InsightWorker, PgStore, WorkerConfig,
};
use tally_core::{ConfigError, TallyError};
use tally_llm::{
    ChatCompletionClient, ChatCompletionProvider, InsightSummarizer, ProviderConfig,
    UnconfiguredProvider,
};
use tally_storage::{CompletionLogStore, InMemoryStore, Store};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env().map_err(TallyError::from)?;

    match DbConfig::from_api_config(&api_config) {
        Some(db_config) => {
            let store = PgStore::connect(&db_config).await?;
            tracing::info!(pool_size = db_config.max_size, "Using Postgres store");
            serve(store, api_config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; data lives in memory only");
            serve(InMemoryStore::new(), api_config).await
        }
    }
}

/// Build the summarizer, start the worker and serve until shutdown.
async fn serve<S>(store: S, api_config: ApiConfig) -> ApiResult<()>
where
    S: Store + Clone + 'static,
{
    let provider = build_provider(Arc::new(store.clone()))?;
    let summarizer = InsightSummarizer::new(provider);

    let worker_config = WorkerConfig::from_env().map_err(TallyError::from)?;
    let (queue, receiver) = InsightQueue::channel(worker_config.queue_capacity);
    let store: Arc<dyn Store> = Arc::new(store);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = InsightWorker::new(Arc::clone(&store), summarizer, queue.clone(), worker_config);
    let worker_handle = tokio::spawn(worker.clone().run(receiver, shutdown_rx));
    // The worker is already draining, so a full queue cannot stall startup.
    worker.recover_unfinished().await?;

    let admin = AdminAuth::new(&api_config.root_token).map_err(TallyError::from)?;
    let state = AppState::new(store, queue, admin);
    let app = create_api_router(state, &api_config)?;

    let addr = api_config.bind_addr;
    tracing::info!(%addr, "Starting Tally API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    let _ = shutdown_tx.send(true);
    match worker_handle.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                completed = snapshot.completed,
                failed = snapshot.failed,
                retried = snapshot.retried,
                "Insight worker stopped"
            );
        }
        Err(e) => tracing::error!(error = %e, "Insight worker task failed"),
    }
    Ok(())
}

/// The configured chat-completion client, or a provider that fails every
/// call when no API key is set.
fn build_provider(
    log_store: Arc<dyn CompletionLogStore>,
) -> ApiResult<Arc<dyn ChatCompletionProvider>> {
    match ProviderConfig::from_env() {
        Ok(config) => {
            let client = ChatCompletionClient::new(config)?.with_log_store(log_store);
            Ok(Arc::new(client))
        }
        Err(ConfigError::MissingRequired { field }) => {
            tracing::warn!(%field, "Summarization provider not configured; insights will fail");
            Ok(Arc::new(UnconfiguredProvider))
        }
        Err(e) => Err(TallyError::from(e).into()),
    }
}
