use crate::application::backtest::tracker::Position;
use crate::domain::errors::SimulationError;
use crate::domain::strategy::OpenAdvice;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Shared price-change math. Every P&L figure in the simulator comes
/// through here.
pub fn pnl(close: Decimal, base: Decimal, coins: Decimal) -> (Decimal, Decimal) {
    let price_change = close - base;
    let pnl_amount = coins * price_change;
    let pnl_percent = price_change / base * Decimal::ONE_HUNDRED;
    (pnl_amount, pnl_percent)
}

/// A priced, affordable open: the caller deducts `cost` from the balance and
/// registers the position with the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenFill {
    /// Entry after slippage.
    pub entry_price: Decimal,
    pub size: Decimal,
    pub fee: Decimal,
    /// size + fee; what actually leaves the balance.
    pub cost: Decimal,
    pub open_time: i64,
    pub target_close_price: Decimal,
}

/// Both P&L views of a close. `realized_pnl` is the per-average-cost figure
/// the tracker and the report use; the per-entry pair exists for trade
/// diagnostics. Mixing them corrupts break-even and win-rate accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseResult {
    pub pnl_amount: Decimal,
    pub pnl_percent: Decimal,
    pub pnl_amount_avg: Decimal,
    pub pnl_percent_avg: Decimal,
    pub close_value: Decimal,
    pub close_fee: Decimal,
    pub open_fee: Decimal,
    /// pnl_amount_avg - open_fee - close_fee.
    pub realized_pnl: Decimal,
    /// close_value - close_fee; returned to the balance. The opening fee was
    /// already deducted at open time.
    pub revenue: Decimal,
    pub close_time: i64,
}

#[derive(Debug, Clone)]
pub struct OrderSimulator {
    fee_rate: Decimal,
    slippage: Decimal,
}

impl OrderSimulator {
    pub fn new(fee_rate: Decimal, slippage: Decimal) -> Self {
        Self { fee_rate, slippage }
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    fn parse_price(raw: &str, field: &'static str) -> Result<Decimal, SimulationError> {
        Decimal::from_str(raw).map_err(|_| SimulationError::MalformedAdvicePrice {
            field,
            value: raw.to_string(),
        })
    }

    /// Prices an open from the advice. Rejects non-open advice, malformed
    /// price strings, and balances that cannot cover size + fee.
    pub fn simulate_open(
        &self,
        advice: &OpenAdvice,
        balance: Decimal,
        open_time: i64,
    ) -> Result<OpenFill, SimulationError> {
        if !advice.should_open {
            return Err(SimulationError::AdviceNotOpen);
        }
        let open_price = Self::parse_price(&advice.open_price, "open_price")?;
        let target_close_price = Self::parse_price(&advice.close_price, "close_price")?;

        let size = advice.position_size;
        let fee = size * self.fee_rate;
        let cost = size + fee;
        if balance < cost {
            return Err(SimulationError::InsufficientBalance {
                need: cost,
                available: balance,
            });
        }

        let entry_price = open_price * (Decimal::ONE + self.slippage);
        Ok(OpenFill {
            entry_price,
            size,
            fee,
            cost,
            open_time,
            target_close_price,
        })
    }

    /// Prices a close at `close_price`. The coin count comes from the
    /// position's own entry price — that is what this open actually bought —
    /// while the realized figure is measured against the book average.
    pub fn simulate_close(
        &self,
        position: &Position,
        close_price: Decimal,
        close_time: i64,
        avg_cost: Decimal,
    ) -> Result<CloseResult, SimulationError> {
        if close_price <= Decimal::ZERO {
            return Err(SimulationError::NonPositiveClosePrice(close_price));
        }
        if avg_cost <= Decimal::ZERO {
            return Err(SimulationError::NonPositiveAvgCost(avg_cost));
        }

        let closed_coins = position.size / position.entry_price;
        let (pnl_amount, pnl_percent) = pnl(close_price, position.entry_price, closed_coins);
        let (pnl_amount_avg, pnl_percent_avg) = pnl(close_price, avg_cost, closed_coins);

        let close_value = position.size + pnl_amount;
        let close_fee = close_value * self.fee_rate;
        let open_fee = position.size * self.fee_rate;
        let realized_pnl = pnl_amount_avg - open_fee - close_fee;
        let revenue = close_value - close_fee;

        Ok(CloseResult {
            pnl_amount,
            pnl_percent,
            pnl_amount_avg,
            pnl_percent_avg,
            close_value,
            close_fee,
            open_fee,
            realized_pnl,
            revenue,
            close_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn advice(open: &str, close: &str) -> OpenAdvice {
        OpenAdvice {
            should_open: true,
            inst_id: "ETH-USDT".to_string(),
            current_price: "100".to_string(),
            open_price: open.to_string(),
            close_price: close.to_string(),
            position_size: dec!(100),
            take_profit_rate: dec!(0.005),
            reason: "simulated_advice".to_string(),
        }
    }

    fn position(entry: Decimal, size: Decimal) -> Position {
        Position {
            id: "pos_1".to_string(),
            entry_price: entry,
            size,
            open_time: 0,
            target_close_price: entry + dec!(1),
        }
    }

    #[test]
    fn test_open_prices_fee_and_cost() {
        let sim = OrderSimulator::new(dec!(0.001), Decimal::ZERO);
        let fill = sim.simulate_open(&advice("99.90", "100.40"), dec!(10000), 5).unwrap();
        assert_eq!(fill.entry_price, dec!(99.90));
        assert_eq!(fill.fee, dec!(0.1));
        assert_eq!(fill.cost, dec!(100.1));
        assert_eq!(fill.target_close_price, dec!(100.40));
        assert_eq!(fill.open_time, 5);
    }

    #[test]
    fn test_open_rejections() {
        let sim = OrderSimulator::new(dec!(0.001), Decimal::ZERO);

        let mut no_open = advice("99.90", "100.40");
        no_open.should_open = false;
        assert_eq!(
            sim.simulate_open(&no_open, dec!(10000), 0).unwrap_err(),
            SimulationError::AdviceNotOpen
        );

        assert!(matches!(
            sim.simulate_open(&advice("", "100.40"), dec!(10000), 0)
                .unwrap_err(),
            SimulationError::MalformedAdvicePrice { field: "open_price", .. }
        ));

        assert_eq!(
            sim.simulate_open(&advice("99.90", "100.40"), dec!(100), 0)
                .unwrap_err(),
            SimulationError::InsufficientBalance {
                need: dec!(100.1),
                available: dec!(100),
            }
        );
    }

    #[test]
    fn test_slippage_raises_entry_only() {
        let sim = OrderSimulator::new(dec!(0.001), dec!(0.0005));
        let fill = sim.simulate_open(&advice("100.00", "100.60"), dec!(10000), 0).unwrap();
        assert_eq!(fill.entry_price, dec!(100.05));
        // Fee is charged on nominal size, not the slipped entry.
        assert_eq!(fill.fee, dec!(0.1));
        assert_eq!(fill.target_close_price, dec!(100.60));
    }

    #[test]
    fn test_close_single_cycle_pnl() {
        // One open-then-close cycle: realized must equal
        // size * (close - entry) / entry - 2 fee legs, with the close fee
        // taken on close_value.
        let sim = OrderSimulator::new(dec!(0.001), Decimal::ZERO);
        let pos = position(dec!(99.90), dec!(100));
        let res = sim.simulate_close(&pos, dec!(100.40), 10, dec!(99.90)).unwrap();

        let coins = dec!(100) / dec!(99.90);
        let expected_gross = coins * dec!(0.50);
        assert_eq!(res.pnl_amount, expected_gross);
        assert_eq!(res.pnl_amount_avg, expected_gross);
        assert_eq!(res.close_value, dec!(100) + expected_gross);
        assert_eq!(res.close_fee, res.close_value * dec!(0.001));
        assert_eq!(res.open_fee, dec!(0.1));
        assert_eq!(res.realized_pnl, expected_gross - dec!(0.1) - res.close_fee);
        assert_eq!(res.revenue, res.close_value - res.close_fee);
        assert!(res.realized_pnl > Decimal::ZERO);
    }

    #[test]
    fn test_close_uses_entry_coins_but_avg_pnl() {
        let sim = OrderSimulator::new(dec!(0.001), Decimal::ZERO);
        // Entry 2500 while the book average is 2549.02: the coin count must
        // come from the entry, the realized P&L from the average.
        let pos = position(dec!(2500), dec!(100));
        let avg = dec!(2549.02);
        let res = sim.simulate_close(&pos, dec!(2600), 0, avg).unwrap();

        let coins = dec!(0.04);
        assert_eq!(res.pnl_amount, coins * dec!(100));
        assert_eq!(res.pnl_amount_avg, coins * (dec!(2600) - avg));
        assert_eq!(res.pnl_percent, dec!(4));
        assert!(res.pnl_amount_avg < res.pnl_amount);
        assert_eq!(
            res.realized_pnl,
            res.pnl_amount_avg - res.open_fee - res.close_fee
        );
    }

    #[test]
    fn test_close_rejections() {
        let sim = OrderSimulator::new(dec!(0.001), Decimal::ZERO);
        let pos = position(dec!(100), dec!(100));
        assert_eq!(
            sim.simulate_close(&pos, Decimal::ZERO, 0, dec!(100)).unwrap_err(),
            SimulationError::NonPositiveClosePrice(Decimal::ZERO)
        );
        assert_eq!(
            sim.simulate_close(&pos, dec!(100), 0, dec!(-1)).unwrap_err(),
            SimulationError::NonPositiveAvgCost(dec!(-1))
        );
    }

    #[test]
    fn test_pnl_helper() {
        let (amount, percent) = pnl(dec!(110), dec!(100), dec!(2));
        assert_eq!(amount, dec!(20));
        assert_eq!(percent, dec!(10));

        let (amount, percent) = pnl(dec!(90), dec!(100), dec!(1));
        assert_eq!(amount, dec!(-10));
        assert_eq!(percent, dec!(-10));
    }
}
