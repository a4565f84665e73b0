use crate::domain::errors::SimulationError;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Coin balances at or below this are treated as fully closed.
const COIN_EPSILON: Decimal = dec!(0.00001);

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: String,
    pub entry_price: Decimal,
    /// Nominal size, quote currency.
    pub size: Decimal,
    /// Unix milliseconds.
    pub open_time: i64,
    pub target_close_price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub id: String,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub open_time: i64,
    pub target_close_price: Decimal,
    pub close_price: Decimal,
    pub close_time: i64,
    /// Per-average-cost realized P&L, net of both fee legs, as supplied by
    /// the simulator.
    pub realized_pnl: Decimal,
    pub hold_ms: i64,
}

/// Open/closed position book with incremental average-cost accounting.
///
/// The running `avg_cost` is the single source of truth: recomputing it from
/// the open list disagrees after partial close sequences, because that
/// weights by coins-ever-opened instead of coins-remaining.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    open: Vec<Position>,
    closed: Vec<ClosedPosition>,
    avg_cost: Decimal,
    total_coins: Decimal,
    next_id: u64,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            open: Vec::new(),
            closed: Vec::new(),
            avg_cost: Decimal::ZERO,
            total_coins: Decimal::ZERO,
            next_id: 1,
        }
    }

    /// Adds an open position, folding it into the running average:
    /// `avg' = (avg * coins + entry * new_coins) / (coins + new_coins)`.
    pub fn add_position(
        &mut self,
        entry_price: Decimal,
        size: Decimal,
        open_time: i64,
        target_close_price: Decimal,
    ) -> Position {
        let new_coins = size / entry_price;
        let total = self.total_coins + new_coins;
        self.avg_cost = if self.total_coins.is_zero() {
            entry_price
        } else {
            (self.avg_cost * self.total_coins + entry_price * new_coins) / total
        };
        self.total_coins = total;

        let position = Position {
            id: format!("pos_{}", self.next_id),
            entry_price,
            size,
            open_time,
            target_close_price,
        };
        self.next_id += 1;
        self.open.push(position.clone());
        position
    }

    /// Closes an open position by id. Coins leave the book at the
    /// position's own entry price; the average cost is untouched until the
    /// book empties, at which point both are clamped to zero.
    pub fn close_position(
        &mut self,
        id: &str,
        close_price: Decimal,
        close_time: i64,
        realized_pnl: Decimal,
    ) -> Result<ClosedPosition, SimulationError> {
        let index = self
            .open
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| SimulationError::PositionNotFound(id.to_string()))?;
        let position = self.open.remove(index);

        self.total_coins -= position.size / position.entry_price;
        if self.total_coins <= COIN_EPSILON {
            self.total_coins = Decimal::ZERO;
            self.avg_cost = Decimal::ZERO;
        }

        let closed = ClosedPosition {
            hold_ms: close_time - position.open_time,
            id: position.id,
            entry_price: position.entry_price,
            size: position.size,
            open_time: position.open_time,
            target_close_price: position.target_close_price,
            close_price,
            close_time,
            realized_pnl,
        };
        self.closed.push(closed.clone());
        Ok(closed)
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.closed
    }

    pub fn average_cost(&self) -> Decimal {
        self.avg_cost
    }

    pub fn total_coins(&self) -> Decimal {
        self.total_coins
    }

    /// Mark-to-market P&L of the open book minus the estimated close fee at
    /// the current price. Fees already paid at open time have left the
    /// balance and are not subtracted again here.
    pub fn unrealized_pnl(&self, current_price: Decimal, fee_rate: Decimal) -> Decimal {
        if self.open.is_empty() {
            return Decimal::ZERO;
        }
        let unrealized = self.total_coins * (current_price - self.avg_cost);
        unrealized - self.total_coins * current_price * fee_rate
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|p| p.realized_pnl).sum()
    }

    /// Sum of open nominal sizes (quote currency), not mark-to-market.
    pub fn total_size(&self) -> Decimal {
        self.open.iter().map(|p| p.size).sum()
    }

    pub fn position_value_at(&self, price: Decimal) -> Decimal {
        self.total_coins * price
    }

    pub fn average_hold_duration(&self) -> Duration {
        if self.closed.is_empty() {
            return Duration::zero();
        }
        let total_ms: i64 = self.closed.iter().map(|p| p.hold_ms).sum();
        Duration::milliseconds(total_ms / self.closed.len() as i64)
    }

    /// Fraction of closed positions with positive realized P&L, in [0, 1].
    pub fn win_rate(&self) -> f64 {
        if self.closed.is_empty() {
            return 0.0;
        }
        let wins = self
            .closed
            .iter()
            .filter(|p| p.realized_pnl > Decimal::ZERO)
            .count();
        wins as f64 / self.closed.len() as f64
    }
}
