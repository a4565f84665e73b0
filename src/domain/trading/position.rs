use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of the caller's open book, used as strategy input. The advisory
/// core never mutates it; the backtest engine rebuilds one per candle from
/// the tracker's running state and the current round's accumulators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub count: usize,
    /// Sum of open nominal sizes, quote currency.
    pub total_size: Decimal,
    /// The tracker's running average cost. Never recomputed from the open
    /// list; that disagrees after partial closes.
    pub avg_price: Decimal,
    /// Fees paid so far in the current round (open and close legs).
    pub fees_paid: Decimal,
    /// Gross per-average-cost P&L realized so far in the current round.
    pub realized_pnl: Decimal,
}

impl PositionSummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Projects the current round's net profit if the remaining book were
    /// closed at `current_price`, and tests it against the `[min, max]`
    /// break-even window.
    ///
    /// The unrealized and close-fee terms mirror the tracker's
    /// `unrealized_pnl` formulation so live advice and replay agree. Fees
    /// already paid have left the balance and enter once, via `fees_paid`.
    pub fn should_break_even(
        &self,
        current_price: Decimal,
        fee_rate: Decimal,
        min: Decimal,
        max: Decimal,
    ) -> (bool, Decimal) {
        if self.is_empty() || self.avg_price <= Decimal::ZERO {
            return (false, Decimal::ZERO);
        }
        let coins = self.total_size / self.avg_price;
        let unrealized = coins * (current_price - self.avg_price);
        let close_fee = coins * current_price * fee_rate;
        let expected = unrealized - close_fee + self.realized_pnl - self.fees_paid;
        (expected >= min && expected <= max, expected)
    }
}
