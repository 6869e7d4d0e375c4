use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use executions::bus::RedisBus;
use executions::config::OrchestratorConfig;
use executions::service::ExecutionsService;
use executions::store::RedisStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = OrchestratorConfig::from_env().context("Invalid configuration")?;

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect state store")?;
    let bus = RedisBus::connect(&config.bus_url)
        .await
        .context("Failed to connect event bus")?;

    let service = ExecutionsService::new(Arc::new(store), Arc::new(bus), config);
    let handle = service.start().await.context("Failed to subscribe")?;
    info!(subjects = ?service.config().subjects, "Executions orchestrator running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    handle.shutdown();
    handle.join().await?;
    Ok(())
}
