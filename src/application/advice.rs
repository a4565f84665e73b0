use crate::domain::market::keys;
use crate::domain::market::{Bar, CandleEvent, Ticker};
use crate::domain::ports::KeyValueStore;
use crate::domain::strategy::{OpenAdvice, OpenAdviceStrategy};
use crate::domain::trading::PositionSummary;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;

/// Advisory port: assembles the advisor's inputs from the shared store and
/// returns its verdict. Stateless about positions — a separate order service
/// supplies a populated summary in production.
pub struct StrategyService {
    store: Arc<dyn KeyValueStore>,
    advisor: Arc<dyn OpenAdviceStrategy>,
    bar: Bar,
}

impl StrategyService {
    pub fn new(store: Arc<dyn KeyValueStore>, advisor: Arc<dyn OpenAdviceStrategy>) -> Self {
        Self {
            store,
            advisor,
            bar: Bar::FiveMin,
        }
    }

    pub async fn get_open_advice(&self, inst_id: &str) -> Result<OpenAdvice> {
        let bar = self.bar.as_str();

        let latest_raw = self
            .store
            .get(&keys::latest_candle(bar, inst_id))
            .await?
            .ok_or_else(|| anyhow!("no latest {bar} candle for '{inst_id}'"))?;
        let latest: CandleEvent = serde_json::from_str(&latest_raw)
            .with_context(|| format!("malformed latest candle for '{inst_id}'"))?;
        let current_candle = latest.to_candle()?;

        // Stored newest-first; the advisor wants chronological order.
        let raw_history = self
            .store
            .list_all(&keys::candle_history(bar, inst_id))
            .await?;
        let mut history = Vec::with_capacity(raw_history.len());
        for raw in &raw_history {
            let event: CandleEvent = serde_json::from_str(raw)
                .with_context(|| format!("malformed history candle for '{inst_id}'"))?;
            history.push(event.to_candle()?);
        }
        history.reverse();

        let ticker: Ticker = self
            .store
            .get(&keys::latest_price(inst_id))
            .await?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .with_context(|| format!("malformed ticker for '{inst_id}'"))?
            .ok_or_else(|| anyhow!("no latest price for '{inst_id}'"))?;
        let current_price = ticker.last_price()?;

        let last_candle = history.last().copied().unwrap_or(current_candle);
        let summary = PositionSummary::default();

        Ok(self.advisor.get_open_advice(
            current_price,
            &current_candle,
            &last_candle,
            &history,
            &summary,
        ))
    }
}
