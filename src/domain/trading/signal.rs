use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
        }
    }
}

/// A trading signal published on the bus for the order path. The advisory
/// core defines the shape but publishes nothing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub price: Decimal,
    /// Nominal size in quote currency.
    pub size: Decimal,
    #[serde(rename = "takeProfitRate")]
    pub take_profit_rate: Decimal,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub reason: String,
}

impl Signal {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
