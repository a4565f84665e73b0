use crate::domain::market::keys;
use crate::domain::market::{Bar, CandleEvent, RetentionPolicy, Ticker};
use crate::domain::ports::{CandleHandler, EventBus, KeyValueStore, TickerHandler};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Persists the latest ticker per instrument and republishes it on the bus.
pub struct TickerPersistHandler {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<dyn EventBus>,
}

impl TickerPersistHandler {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }
}

#[async_trait]
impl TickerHandler for TickerPersistHandler {
    async fn handle(&self, ticker: &Ticker) -> Result<()> {
        let payload = serde_json::to_string(ticker).context("ticker serialization failed")?;
        self.store
            .set_with_ttl(&keys::latest_price(&ticker.inst_id), payload.clone(), keys::TICKER_TTL)
            .await?;

        if let Err(e) = self
            .bus
            .publish(&keys::ticker_channel(&ticker.inst_id), payload)
            .await
        {
            debug!(inst_id = %ticker.inst_id, error = %e, "ticker publish skipped");
        }
        Ok(())
    }
}

/// Persists every candle as the in-progress latest and appends confirmed
/// candles to the bounded per-bar history.
pub struct CandlePersistHandler {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<dyn EventBus>,
    retention: RetentionPolicy,
}

impl CandlePersistHandler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        bus: Arc<dyn EventBus>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            bus,
            retention,
        }
    }
}

#[async_trait]
impl CandleHandler for CandlePersistHandler {
    async fn handle(&self, candle: &CandleEvent) -> Result<()> {
        let payload = serde_json::to_string(candle).context("candle serialization failed")?;
        let ttl = Bar::latest_ttl_for_label(&candle.bar);
        self.store
            .set_with_ttl(
                &keys::latest_candle(&candle.bar, &candle.inst_id),
                payload.clone(),
                ttl,
            )
            .await?;

        if candle.confirmed() {
            let history_key = keys::candle_history(&candle.bar, &candle.inst_id);
            let max_len = self.retention.max_len_for_label(&candle.bar);

            // A resent confirmed bar replaces the head instead of
            // duplicating: (instId, bar, ts) identifies a candle uniquely.
            let replace_head = match self.store.list_head(&history_key).await {
                Ok(Some(head)) => serde_json::from_str::<CandleEvent>(&head)
                    .map(|existing| existing.ts == candle.ts)
                    .unwrap_or(false),
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %history_key, error = %e, "history head read failed");
                    false
                }
            };

            // History failures never disturb the latest-candle write.
            if let Err(e) = self
                .store
                .push_trimmed(&history_key, payload.clone(), max_len, replace_head)
                .await
            {
                warn!(key = %history_key, error = %e, "candle history append failed");
            }
        }

        if let Err(e) = self
            .bus
            .publish(&keys::candle_channel(&candle.bar, &candle.inst_id), payload)
            .await
        {
            debug!(
                inst_id = %candle.inst_id,
                bar = %candle.bar,
                error = %e,
                "candle publish skipped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store and bus fakes used across the ingest and advisory
    //! tests. `push_trimmed` mirrors the atomic LPUSH+LTRIM contract.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    pub struct MemoryStore {
        pub values: Mutex<HashMap<String, String>>,
        pub lists: Mutex<HashMap<String, Vec<String>>>,
        pub ttls: Mutex<HashMap<String, Duration>>,
    }

    #[async_trait]
    impl KeyValueStore for MemoryStore {
        async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
            self.values.lock().unwrap().insert(key.to_string(), value);
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        async fn list_head(&self, key: &str) -> Result<Option<String>> {
            Ok(self
                .lists
                .lock()
                .unwrap()
                .get(key)
                .and_then(|list| list.first().cloned()))
        }

        async fn push_trimmed(
            &self,
            key: &str,
            value: String,
            max_len: usize,
            replace_head: bool,
        ) -> Result<()> {
            let mut lists = self.lists.lock().unwrap();
            let list = lists.entry(key.to_string()).or_default();
            if replace_head && !list.is_empty() {
                list.remove(0);
            }
            list.insert(0, value);
            list.truncate(max_len);
            Ok(())
        }

        async fn list_all(&self, key: &str) -> Result<Vec<String>> {
            Ok(self.lists.lock().unwrap().get(key).cloned().unwrap_or_default())
        }

        async fn scan_delete(&self, pattern: &str) -> Result<u64> {
            let prefix = pattern.trim_end_matches('*');
            let mut removed = 0u64;
            let mut values = self.values.lock().unwrap();
            let doomed: Vec<String> = values
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            for key in doomed {
                values.remove(&key);
                removed += 1;
            }
            let mut lists = self.lists.lock().unwrap();
            let doomed: Vec<String> = lists
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            for key in doomed {
                lists.remove(&key);
                removed += 1;
            }
            Ok(removed)
        }
    }

    #[derive(Default)]
    pub struct MemoryBus {
        pub published: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl EventBus for MemoryBus {
        async fn publish(&self, channel: &str, payload: String) -> Result<()> {
            if self.fail {
                anyhow::bail!("bus unavailable");
            }
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), payload));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryBus, MemoryStore};
    use super::*;
    use std::time::Duration;

    fn ticker(last: &str, ts: &str) -> Ticker {
        Ticker {
            inst_id: "ETH-USDT".to_string(),
            last: last.to_string(),
            open_24h: String::new(),
            high_24h: String::new(),
            low_24h: String::new(),
            vol_24h: String::new(),
            vol_ccy_24h: String::new(),
            ts: ts.to_string(),
        }
    }

    fn confirmed_candle(ts: i64) -> CandleEvent {
        CandleEvent {
            inst_id: "ETH-USDT".to_string(),
            bar: "1m".to_string(),
            ts: ts.to_string(),
            o: "100".to_string(),
            h: "101".to_string(),
            l: "99".to_string(),
            c: "100.5".to_string(),
            vol: "1".to_string(),
            vol_ccy: "100".to_string(),
            vol_ccy_quote: "100".to_string(),
            confirm: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ticker_persisted_with_ttl_and_published() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let handler = TickerPersistHandler::new(store.clone(), bus.clone());

        handler.handle(&ticker("3894.94", "1")).await.unwrap();

        let key = "price.latest.ETH-USDT";
        assert!(store.values.lock().unwrap().contains_key(key));
        assert_eq!(
            store.ttls.lock().unwrap().get(key).copied(),
            Some(Duration::from_secs(60))
        );
        let published = bus.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "market.ticker.ETH-USDT");
    }

    #[tokio::test]
    async fn test_bus_failure_does_not_fail_handler() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus {
            fail: true,
            ..Default::default()
        });
        let handler = TickerPersistHandler::new(store.clone(), bus);
        assert!(handler.handle(&ticker("1.0", "1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unconfirmed_candle_only_updates_latest() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let handler =
            CandlePersistHandler::new(store.clone(), bus, RetentionPolicy::default());

        let mut event = confirmed_candle(1);
        event.confirm = "0".to_string();
        handler.handle(&event).await.unwrap();

        assert!(store
            .values
            .lock()
            .unwrap()
            .contains_key("candle.latest.1m.ETH-USDT"));
        assert!(store.lists.lock().unwrap().is_empty());
        // Latest-candle TTL for 1m is two bar-widths.
        assert_eq!(
            store
                .ttls
                .lock()
                .unwrap()
                .get("candle.latest.1m.ETH-USDT")
                .copied(),
            Some(Duration::from_secs(120))
        );
    }

    #[tokio::test]
    async fn test_retention_trim_keeps_newest_three() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let retention = RetentionPolicy::empty().with_limit(Bar::OneMin, 3);
        let handler = CandlePersistHandler::new(store.clone(), bus, retention);

        for ts in [1, 2, 3, 4] {
            handler.handle(&confirmed_candle(ts)).await.unwrap();
        }

        let lists = store.lists.lock().unwrap();
        let history = lists.get("candle.history.1m.ETH-USDT").unwrap();
        assert_eq!(history.len(), 3);
        let order: Vec<String> = history
            .iter()
            .map(|raw| serde_json::from_str::<CandleEvent>(raw).unwrap().ts)
            .collect();
        assert_eq!(order, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn test_duplicate_confirmed_candle_replaces_head() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let handler =
            CandlePersistHandler::new(store.clone(), bus, RetentionPolicy::default());

        handler.handle(&confirmed_candle(10)).await.unwrap();
        let mut resent = confirmed_candle(10);
        resent.c = "100.7".to_string();
        handler.handle(&resent).await.unwrap();

        let lists = store.lists.lock().unwrap();
        let history = lists.get("candle.history.1m.ETH-USDT").unwrap();
        assert_eq!(history.len(), 1);
        let head: CandleEvent = serde_json::from_str(&history[0]).unwrap();
        assert_eq!(head.c, "100.7");
    }

    #[tokio::test]
    async fn test_unknown_bar_uses_fallback_ttl_and_default_bound() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(MemoryBus::default());
        let handler =
            CandlePersistHandler::new(store.clone(), bus, RetentionPolicy::default());

        let mut event = confirmed_candle(1);
        event.bar = "9m".to_string();
        handler.handle(&event).await.unwrap();

        assert_eq!(
            store
                .ttls
                .lock()
                .unwrap()
                .get("candle.latest.9m.ETH-USDT")
                .copied(),
            Some(Duration::from_secs(60))
        );
    }
}
