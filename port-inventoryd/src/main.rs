mod api;
mod config;
mod error;
mod snapshot;
mod store;
mod store_manager;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::snapshot::interfaces::InterfaceFilter;
use crate::snapshot::sockets::SsSocketSource;
use crate::store::AnnotationData;
use crate::store_manager::StoreHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("port_inventoryd=info")),
        )
        .init();

    tracing::info!("Starting port-inventoryd");

    // Load config, writing the default file on first start
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/port-inventory/config.toml".to_string());

    let config = Config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Load annotations and start the store thread
    let annotations = AnnotationData::load(&config.store.data_path);
    let store_handle = StoreHandle::spawn(annotations, config.store.data_path.clone());

    // HTTP client for the public IP lookup
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.snapshot.public_ip_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let filter = InterfaceFilter::new(&config.snapshot.exclude_interfaces);

    // Build API router
    let app_state = api::routes::AppState {
        store: store_handle.clone(),
        sockets: Arc::new(SsSocketSource),
        filter: Arc::new(filter),
        http,
        snapshot: Arc::new(config.snapshot.clone()),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.listen))?;

    tracing::info!("API listening on {}", config.server.listen);

    // Run server with graceful shutdown
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation and wait for the server to drain
    cancel.cancel();
    let _ = server_handle.await;

    // Shutdown store thread
    if let Err(e) = store_handle.shutdown().await {
        tracing::error!("Failed to shutdown annotation store: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
