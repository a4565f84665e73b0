use crate::config::Config;
use crate::domain::market::keys;
use crate::domain::market::RetentionPolicy;
use crate::domain::ports::{EventBus, KeyValueStore};
use crate::infrastructure::exchange::{MarketDataManager, WsConfig};
use crate::application::ingest::handlers::{CandlePersistHandler, TickerPersistHandler};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Removes every ingress key written by this service. Used on shutdown so a
/// restart begins from a clean keyspace.
pub async fn cleanup_ingress_keys(store: &dyn KeyValueStore) -> Result<u64> {
    let mut total = 0u64;
    for pattern in keys::CLEANUP_PATTERNS {
        let removed = store
            .scan_delete(pattern)
            .await
            .with_context(|| format!("cleanup of '{pattern}' failed"))?;
        info!(pattern, removed, "ingress keys removed");
        total += removed;
    }
    Ok(total)
}

/// Market-data ingress: one manager on the public endpoint for tickers, one
/// on the business endpoint for candles, both persisting through the same
/// store and bus.
pub struct IngestService {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    public: Arc<MarketDataManager>,
    business: Arc<MarketDataManager>,
}

impl IngestService {
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, bus: Arc<dyn EventBus>) -> Self {
        let public = Arc::new(MarketDataManager::new(WsConfig::new(
            config.public_ws_url.clone(),
        )));
        let business = Arc::new(MarketDataManager::new(WsConfig::new(
            config.business_ws_url.clone(),
        )));

        public.add_ticker_handler(Arc::new(TickerPersistHandler::new(
            store.clone(),
            bus.clone(),
        )));
        business.add_candle_handler(Arc::new(CandlePersistHandler::new(
            store.clone(),
            bus,
            RetentionPolicy::default(),
        )));

        Self {
            config,
            store,
            public,
            business,
        }
    }

    /// Connects both managers and subscribes the configured instruments.
    pub async fn start(&self) -> Result<()> {
        if self.config.ticker_enabled {
            self.public
                .connect()
                .await
                .context("public endpoint connect failed")?;
            for inst_id in &self.config.instruments {
                self.public
                    .subscribe_ticker(inst_id)
                    .await
                    .with_context(|| format!("ticker subscription for '{inst_id}' failed"))?;
                info!(inst_id, "ticker subscribed");
            }
        }

        if !self.config.candle_bars.is_empty() {
            self.business
                .connect()
                .await
                .context("business endpoint connect failed")?;
            for inst_id in &self.config.instruments {
                for bar in &self.config.candle_bars {
                    self.business
                        .subscribe_candle(inst_id, bar.as_str())
                        .await
                        .with_context(|| {
                            format!("candle subscription for '{inst_id}' {bar} failed")
                        })?;
                    info!(inst_id, bar = %bar, "candle subscribed");
                }
            }
        }
        Ok(())
    }

    /// Resolves when either upstream connection terminates. The caller
    /// rebuilds the service and replays subscriptions from the managers'
    /// bookkeeping.
    pub async fn wait_disconnected(&self) {
        tokio::select! {
            _ = self.public.wait(), if self.config.ticker_enabled => {
                warn!("public endpoint connection ended");
            }
            _ = self.business.wait(), if !self.config.candle_bars.is_empty() => {
                warn!("business endpoint connection ended");
            }
            else => {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Orderly shutdown: drop subscriptions, close both connections, then
    /// clean the ingress keyspace.
    pub async fn shutdown(&self) {
        for inst_id in self.public.ticker_subscriptions().await {
            if let Err(e) = self.public.unsubscribe_ticker(&inst_id).await {
                warn!(inst_id, error = %e, "ticker unsubscribe failed");
            }
        }
        for (inst_id, bar) in self.business.candle_subscriptions().await {
            if let Err(e) = self.business.unsubscribe_candle(&inst_id, &bar).await {
                warn!(inst_id, bar, error = %e, "candle unsubscribe failed");
            }
        }

        self.public.close().await;
        self.business.close().await;

        match cleanup_ingress_keys(self.store.as_ref()).await {
            Ok(total) => info!(total, "ingress cleanup complete"),
            Err(e) => warn!(error = %e, "ingress cleanup failed"),
        }
    }
}
