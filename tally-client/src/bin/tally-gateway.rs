//! Admin gateway entry point.
//!
//! Serves `/admin/*` with the root token injected until Ctrl-C.

use tally_client::{create_gateway_router, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    let app = create_gateway_router(&config)?;

    let addr = config.bind_addr;
    tracing::info!(%addr, backend = %config.backend_url, "Starting Tally admin gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
