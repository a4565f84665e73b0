use crate::domain::errors::ValidationError;
use crate::domain::market::price::Price;
use serde::{Deserialize, Serialize};

/// A normalized ticker snapshot. All numeric fields are carried as exact
/// decimal strings through ingest and stored verbatim; downstream consumers
/// parse what they need. Unknown upstream fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub last: String,
    #[serde(default, rename = "open24h")]
    pub open_24h: String,
    #[serde(default, rename = "high24h")]
    pub high_24h: String,
    #[serde(default, rename = "low24h")]
    pub low_24h: String,
    /// 24h volume in base currency.
    #[serde(default, rename = "vol24h")]
    pub vol_24h: String,
    /// 24h volume in quote currency.
    #[serde(default, rename = "volCcy24h")]
    pub vol_ccy_24h: String,
    /// Snapshot time, unix milliseconds, as a decimal string.
    pub ts: String,
}

impl Ticker {
    pub fn last_price(&self) -> Result<Price, ValidationError> {
        Price::parse(&self.last, "last")
    }
}
