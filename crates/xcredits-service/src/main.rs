//! xcredits Service - HTTP API for download credits
//!
//! This is the main entry point for the xcredits service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xcredits_service::{create_router, spawn_maintenance, AppState, ServiceConfig};
use xcredits_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,xcredits=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting xcredits service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        jwt_configured = %config.auth_jwt_secret.is_some(),
        admin_configured = %config.admin_api_key.is_some(),
        wechat_configured = %config.wechat.is_some(),
        alipay_configured = %config.alipay.is_some(),
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    // Build app state
    let state = AppState::new(store, config.clone());

    let sweeper = spawn_maintenance(
        state.engines.clone(),
        Duration::from_secs(config.sweep_interval_seconds.max(1)),
    );
    tracing::info!(
        interval_seconds = config.sweep_interval_seconds,
        "Expiry sweeper started"
    );

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(xcredits_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(_config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!("Built without RocksDB - using in-memory store, data will not persist");
    Ok(Arc::new(xcredits_store::MemoryStore::new()))
}
