//! Devicewatch server binary

use anyhow::Context;
use common::logging::{self, LogFormat};
use devicewatch_server::{Config, DeviceWatchServer, seed_inventory};
use inventory::MemoryStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is not up yet, so config errors go to stderr via anyhow
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load_from(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => Config::load().context("failed to load configuration")?,
    };

    logging::init_with(
        config.logging.level.as_deref().unwrap_or("info"),
        LogFormat::parse(config.logging.format.as_deref()),
    );

    tracing::info!("Devicewatch server starting");

    let store = Arc::new(MemoryStore::new());
    let server = DeviceWatchServer::new(config.to_server_config(), store.clone(), store.clone());

    seed_inventory(&config.inventory, &store, &server.versions())
        .await
        .context("failed to seed inventory")?;

    server.run().await.context("devicewatch server failed")?;

    Ok(())
}
