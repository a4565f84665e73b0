use crate::domain::market::{Candle, CandleEvent};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Loads a candle dataset: a JSON array of stored candle events (the same
/// shape the ingest path writes). Returns validated candles in
/// chronological order.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let file = File::open(path)
        .with_context(|| format!("cannot open data file '{}'", path.display()))?;
    let events: Vec<CandleEvent> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("unreadable candle JSON in '{}'", path.display()))?;

    let mut candles = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        let candle = event
            .to_candle()
            .with_context(|| format!("invalid candle at index {i}"))?;
        candles.push(candle);
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
