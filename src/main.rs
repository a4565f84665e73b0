//! Gridbot ingest service - market data ingress
//!
//! Connects to the exchange's public (tickers) and business (candles)
//! WebSocket endpoints, normalizes the streams, persists them to the shared
//! KV store and republishes them on the bus. Runs headless; Ctrl+C triggers
//! an orderly shutdown that also clears the ingress keyspace.
//!
//! # Environment Variables
//! - `REDIS_ADDR`, `REDIS_PASSWORD`, `REDIS_DB` - KV store connection
//! - `PUBLIC_WS_URL`, `BUSINESS_WS_URL` - upstream endpoints
//! - `INSTRUMENTS` - comma-separated instrument ids (default ETH-USDT)
//! - `CANDLE_BARS` - comma-separated bar labels (default 5m)
//! - `LOG_LEVEL`, `ENVIRONMENT` - logging setup

use anyhow::{Context, Result};
use gridbot::application::ingest::IngestService;
use gridbot::config::{Config, Environment};
use gridbot::infrastructure::{KvStore, MessageBus};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.environment {
        Environment::Production => builder.compact().init(),
        Environment::Development => builder.pretty().init(),
    }

    info!("Gridbot ingest {} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        instruments = ?config.instruments,
        bars = ?config.candle_bars,
        ticker = config.ticker_enabled,
        "configuration loaded"
    );

    // A failed store probe is fatal: the service is useless without it.
    let store = KvStore::connect(&config.redis_url())
        .await
        .context("kv store startup probe failed")?;
    let bus = MessageBus::connect(&config.redis_url())
        .await
        .context("bus connection failed")?;

    let service = IngestService::new(config, Arc::new(store), Arc::new(bus));
    service.start().await.context("ingest startup failed")?;
    info!("ingest running. Press Ctrl+C to shut down.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = service.wait_disconnected() => {
            warn!("upstream connection lost; shutting down for a clean rebuild");
        }
    }

    service.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
