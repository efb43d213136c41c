use ingestor::config::Config;
use ingestor::metrics;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    info!("Starting Open-SmartWatch ingestor");
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Store capacity: {}, default query limit: {}, report every {:?}",
        config.store_capacity, config.default_query_limit, config.report_interval
    );

    metrics::init_metrics()?;

    if let Err(e) = ingestor::run(config, shutdown_signal()).await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
