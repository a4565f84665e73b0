use crate::domain::market::{CandleEvent, Ticker};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Callback invoked for every normalized ticker. Runs on the read pump:
/// implementations must stay short and offload long work.
#[async_trait]
pub trait TickerHandler: Send + Sync {
    async fn handle(&self, ticker: &Ticker) -> Result<()>;
}

/// Callback invoked for every normalized candle event.
#[async_trait]
pub trait CandleHandler: Send + Sync {
    async fn handle(&self, candle: &CandleEvent) -> Result<()>;
}

/// Typed key/value operations the ingest and advisory paths need. The
/// production implementation targets a text-protocol store; any alternative
/// must keep `push_trimmed` atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Head element of a list key, if any.
    async fn list_head(&self, key: &str) -> Result<Option<String>>;
    /// Pushes `value` at the head and trims the list to `max_len` in one
    /// atomic operation. With `replace_head`, the previous head is dropped
    /// first (duplicate-send replacement).
    async fn push_trimmed(
        &self,
        key: &str,
        value: String,
        max_len: usize,
        replace_head: bool,
    ) -> Result<()>;
    /// Full list contents, newest first.
    async fn list_all(&self, key: &str) -> Result<Vec<String>>;
    /// Deletes every key matching `pattern` via cursor iteration; returns
    /// the number of keys removed.
    async fn scan_delete(&self, pattern: &str) -> Result<u64>;
}

/// Channel-based publish seam. Publishing is best-effort: callers log
/// failures and move on.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<()>;
}
