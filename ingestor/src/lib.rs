//! In-memory telemetry ingestion service for wearable devices.
//!
//! Watches post sensor readings to `/api/data`; the service keeps the most
//! recent entries in a bounded log, tracks per-device status and serves both
//! back over HTTP.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod reporter;
pub mod rest;
pub mod store;

use crate::config::Config;
use crate::errors::Result;
use crate::rest::AppState;
use crate::store::Store;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Binds the HTTP server, starts the reporter and serves until `shutdown`
/// resolves.
pub async fn run<F>(config: Config, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config.http_addr.parse()?;
    let store = Store::shared(config.store_capacity);

    let (stop_tx, stop_rx) = watch::channel(false);
    let reporter_handle = tokio::spawn(reporter::run_reporter(
        store.clone(),
        config.report_interval,
        stop_rx,
    ));

    let app = rest::create_router(AppState {
        store,
        default_limit: config.default_query_limit,
    });

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);
    info!("Endpoints:");
    info!("   GET    /            - Server status");
    info!("   POST   /api/data    - Receive sensor data");
    info!("   GET    /api/data    - Get stored data");
    info!("   GET    /api/devices - Get device status");
    info!("   POST   /api/command - Send command to device");
    info!("   DELETE /api/data    - Clear data");
    info!("   GET    /metrics     - Prometheus metrics");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    let _ = stop_tx.send(true);
    if let Err(e) = reporter_handle.await {
        error!("Reporter task failed: {}", e);
    }

    served?;
    info!("HTTP server stopped");
    Ok(())
}
