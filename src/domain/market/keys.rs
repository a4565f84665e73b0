//! Storage keyspace and bus channel naming. The keyspace is flat and
//! dot-delimited; every value is UTF-8 JSON.

use std::time::Duration;

/// TTL for the latest-ticker key.
pub const TICKER_TTL: Duration = Duration::from_secs(60);

/// Patterns removed by the ingest shutdown cleanup.
pub const CLEANUP_PATTERNS: [&str; 3] = ["price.latest.*", "candle.latest.*", "candle.history.*"];

pub fn latest_price(inst_id: &str) -> String {
    format!("price.latest.{inst_id}")
}

pub fn latest_candle(bar: &str, inst_id: &str) -> String {
    format!("candle.latest.{bar}.{inst_id}")
}

pub fn candle_history(bar: &str, inst_id: &str) -> String {
    format!("candle.history.{bar}.{inst_id}")
}

pub fn ticker_channel(inst_id: &str) -> String {
    format!("market.ticker.{inst_id}")
}

pub fn candle_channel(bar: &str, inst_id: &str) -> String {
    format!("market.candle.{bar}.{inst_id}")
}

pub fn signal_channel(inst_id: &str) -> String {
    format!("strategy.signals.{inst_id}")
}
