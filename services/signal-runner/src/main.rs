//! Signal Runner - polls one market and tracks indicator-driven trade signals
//!
//! 1. Loads configuration (file + `SIGNAL_RUNNER__*` environment)
//! 2. Restores persisted history, statistics and cooldown
//! 3. Primes indicators and price, then runs the tick loop
//! 4. On Ctrl-C stops the loop and saves state

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use market_data::BinanceClient;
use signal_runner::{JsonStateStore, LogPresenter, RunnerConfig, TradingOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting Signal Runner...");

    let config = RunnerConfig::load().context("loading configuration")?;
    info!(
        "Market: {} {} via {}",
        config.market.symbol, config.market.timeframe, config.market.base_url
    );

    let source = BinanceClient::new(
        &config.market.base_url,
        std::time::Duration::from_secs(config.market.request_timeout_secs),
    )
    .context("creating market data client")?;
    let store = JsonStateStore::new(&config.storage.state_dir);
    info!("State file: {}", store.path().display());

    let mut orchestrator = TradingOrchestrator::new(
        config,
        Arc::new(source),
        Arc::new(store),
        Arc::new(LogPresenter),
    );

    orchestrator.restore().await;
    if let Err(e) = orchestrator.prime(chrono::Utc::now()).await {
        warn!("Initial refresh failed: {}", e);
    }

    let handle = orchestrator.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    let orchestrator = handle.stop().await?;
    orchestrator.persist(chrono::Utc::now()).await;

    info!("Signal Runner stopped");
    Ok(())
}
