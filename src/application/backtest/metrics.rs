use crate::application::backtest::tracker::PositionTracker;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Profit factor reported when there are profits and no losses at all.
const PROFIT_FACTOR_CAP: f64 = 999.99;

/// Lifetime totals the engine accumulates across the replay.
#[derive(Debug, Clone, Default)]
pub struct ReplayTotals {
    pub total_opened_trades: u64,
    /// Gross per-average-cost P&L across closes.
    pub total_profit_gross_avg: Decimal,
    /// Gross per-entry P&L across closes, for trade analytics.
    pub total_profit_gross_entry: Decimal,
    pub total_fees_open: Decimal,
    pub total_fees_close: Decimal,
}

/// The final report. Internals are computed on the exact-decimal type; the
/// public surface is floating point.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_equity: f64,
    pub net_profit: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of closed trades with positive realized P&L.
    pub win_rate: f64,
    pub profit_factor: f64,
    pub unrealized_pnl: f64,
    pub open_positions: usize,
    pub open_position_notional: f64,
    pub total_opened_trades: u64,
    pub total_profit_gross: f64,
    pub total_profit_gross_entry: f64,
    pub total_fees_open: f64,
    pub total_fees_close: f64,
    pub total_fees_paid: f64,
    pub average_hold_secs: i64,
    pub mark_price: f64,
}

/// Derives the report from the tracker's final state, the balance walk, and
/// the replay totals.
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    initial_balance: Decimal,
    fee_rate: Decimal,
}

impl MetricsCalculator {
    pub fn new(initial_balance: Decimal, fee_rate: Decimal) -> Self {
        Self {
            initial_balance,
            fee_rate,
        }
    }

    pub fn calculate(
        &self,
        tracker: &PositionTracker,
        final_balance: Decimal,
        mark_price: Decimal,
        snapshots: &[Decimal],
        totals: &ReplayTotals,
    ) -> BacktestReport {
        let unrealized = tracker.unrealized_pnl(mark_price, self.fee_rate);
        let total_fees_paid = totals.total_fees_open + totals.total_fees_close;
        let net_profit = totals.total_profit_gross_avg + unrealized - total_fees_paid;
        let notional = tracker.total_size();
        let total_equity = final_balance + notional + unrealized;

        let total_return_pct = if self.initial_balance > Decimal::ZERO {
            (net_profit / self.initial_balance * Decimal::ONE_HUNDRED).trunc_with_scale(2)
        } else {
            Decimal::ZERO
        };

        let closed = tracker.closed_positions();
        let winning = closed
            .iter()
            .filter(|p| p.realized_pnl > Decimal::ZERO)
            .count();
        let losing = closed
            .iter()
            .filter(|p| p.realized_pnl < Decimal::ZERO)
            .count();
        let win_rate = if closed.is_empty() {
            0.0
        } else {
            winning as f64 / closed.len() as f64 * 100.0
        };

        BacktestReport {
            initial_balance: to_f64(self.initial_balance),
            final_balance: to_f64(final_balance),
            total_equity: to_f64(total_equity),
            net_profit: to_f64(net_profit),
            total_return_pct: to_f64(total_return_pct),
            max_drawdown_pct: to_f64(Self::max_drawdown(snapshots)),
            total_trades: closed.len(),
            winning_trades: winning,
            losing_trades: losing,
            win_rate,
            profit_factor: self.profit_factor(tracker, unrealized),
            unrealized_pnl: to_f64(unrealized),
            open_positions: tracker.open_positions().len(),
            open_position_notional: to_f64(notional),
            total_opened_trades: totals.total_opened_trades,
            total_profit_gross: to_f64(totals.total_profit_gross_avg),
            total_profit_gross_entry: to_f64(totals.total_profit_gross_entry),
            total_fees_open: to_f64(totals.total_fees_open),
            total_fees_close: to_f64(totals.total_fees_close),
            total_fees_paid: to_f64(total_fees_paid),
            average_hold_secs: tracker.average_hold_duration().num_seconds(),
            mark_price: to_f64(mark_price),
        }
    }

    /// Peak-to-sample walk over the recorded balance snapshots.
    fn max_drawdown(snapshots: &[Decimal]) -> Decimal {
        let mut peak = Decimal::ZERO;
        let mut max_drawdown = Decimal::ZERO;
        for &sample in snapshots {
            if sample > peak {
                peak = sample;
            }
            if peak > Decimal::ZERO {
                let drawdown = (peak - sample) / peak * Decimal::ONE_HUNDRED;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }
        max_drawdown
    }

    /// Gross profits over gross losses. Unrealized P&L joins whichever side
    /// it belongs to; all-profit books report the cap.
    fn profit_factor(&self, tracker: &PositionTracker, unrealized: Decimal) -> f64 {
        let mut profits = Decimal::ZERO;
        let mut losses = Decimal::ZERO;
        for position in tracker.closed_positions() {
            if position.realized_pnl > Decimal::ZERO {
                profits += position.realized_pnl;
            } else {
                losses += position.realized_pnl.abs();
            }
        }
        if unrealized > Decimal::ZERO {
            profits += unrealized;
        } else {
            losses += unrealized.abs();
        }

        if losses.is_zero() {
            if profits > Decimal::ZERO {
                PROFIT_FACTOR_CAP
            } else {
                0.0
            }
        } else {
            to_f64(profits / losses)
        }
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn calculator() -> MetricsCalculator {
        MetricsCalculator::new(dec!(10000), dec!(0.001))
    }

    fn tracker_with_closes(pnls: &[Decimal]) -> PositionTracker {
        let mut tracker = PositionTracker::new();
        for (i, &pnl) in pnls.iter().enumerate() {
            let pos = tracker.add_position(dec!(100), dec!(100), i as i64, dec!(101));
            tracker
                .close_position(&pos.id, dec!(101), i as i64 + 1000, pnl)
                .unwrap();
        }
        tracker
    }

    #[test]
    fn test_win_rate_identity() {
        let tracker = tracker_with_closes(&[dec!(1), dec!(2), dec!(-0.5), dec!(0.2)]);
        let report = calculator().calculate(
            &tracker,
            dec!(10002.7),
            dec!(101),
            &[dec!(10000)],
            &ReplayTotals::default(),
        );
        assert_eq!(report.total_trades, 4);
        assert_eq!(report.winning_trades, 3);
        assert_eq!(report.losing_trades, 1);
        assert_eq!(
            report.win_rate,
            report.winning_trades as f64 / report.total_trades as f64 * 100.0
        );
    }

    #[test]
    fn test_net_profit_and_return_truncation() {
        let tracker = tracker_with_closes(&[dec!(5)]);
        let totals = ReplayTotals {
            total_opened_trades: 1,
            total_profit_gross_avg: dec!(5.3),
            total_profit_gross_entry: dec!(5.3),
            total_fees_open: dec!(0.1),
            total_fees_close: dec!(0.2),
        };
        let report = calculator().calculate(
            &tracker,
            dec!(10005),
            dec!(101),
            &[dec!(10000), dec!(10005)],
            &totals,
        );
        // net = 5.3 + 0 - 0.3 = 5.0; return = 0.05% -> truncated to 0.05.
        assert_eq!(report.net_profit, 5.0);
        assert_eq!(report.total_return_pct, 0.05);
        assert_eq!(report.total_fees_paid, 0.3);
    }

    #[test]
    fn test_return_truncates_toward_zero() {
        // 1.999...% must report as 1.99, not 2.00.
        let tracker = PositionTracker::new();
        let totals = ReplayTotals {
            total_profit_gross_avg: dec!(199.9),
            ..Default::default()
        };
        let report = calculator().calculate(
            &tracker,
            dec!(10199.9),
            dec!(100),
            &[],
            &totals,
        );
        assert_eq!(report.total_return_pct, 1.99);
    }

    #[test]
    fn test_max_drawdown_walk() {
        let snapshots = [
            dec!(10000),
            dec!(10500),
            dec!(9450), // 10% below the 10500 peak
            dec!(10200),
            dec!(10100),
        ];
        let dd = MetricsCalculator::max_drawdown(&snapshots);
        assert_eq!(dd, dec!(10));
    }

    #[test]
    fn test_profit_factor_cap_and_unrealized_folding() {
        let tracker = tracker_with_closes(&[dec!(2), dec!(3)]);
        // No losses anywhere: capped.
        let report = calculator().calculate(
            &tracker,
            dec!(10005),
            dec!(101),
            &[],
            &ReplayTotals::default(),
        );
        assert_eq!(report.profit_factor, 999.99);

        // A losing close turns it into a plain ratio.
        let tracker = tracker_with_closes(&[dec!(6), dec!(-2)]);
        let report = calculator().calculate(
            &tracker,
            dec!(10004),
            dec!(101),
            &[],
            &ReplayTotals::default(),
        );
        assert_eq!(report.profit_factor, 3.0);

        // Negative unrealized joins the loss side: an open position under
        // water makes the denominator grow.
        let mut tracker = tracker_with_closes(&[dec!(6), dec!(-2)]);
        tracker.add_position(dec!(100), dec!(100), 0, dec!(101));
        let report = calculator().calculate(
            &tracker,
            dec!(9900),
            dec!(98), // unrealized = 1 * (98 - 100) - 98 * 0.001 = -2.098
            &[],
            &ReplayTotals::default(),
        );
        let expected = 6.0 / (2.0 + 2.098);
        assert!((report.profit_factor - expected).abs() < 1e-9);
    }

    #[test]
    fn test_equity_composition() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(dec!(100), dec!(100), 0, dec!(101));
        let report = calculator().calculate(
            &tracker,
            dec!(9899.9),
            dec!(110),
            &[],
            &ReplayTotals::default(),
        );
        // equity = balance + notional + unrealized(9.89)
        assert_eq!(report.open_positions, 1);
        assert_eq!(report.open_position_notional, 100.0);
        assert!((report.total_equity - (9899.9 + 100.0 + 9.89)).abs() < 1e-9);
        assert_eq!(report.unrealized_pnl, 9.89);
    }

    #[test]
    fn test_zero_initial_balance_reports_zero_return() {
        let calc = MetricsCalculator::new(Decimal::ZERO, dec!(0.001));
        let tracker = PositionTracker::new();
        let report = calc.calculate(
            &tracker,
            Decimal::ZERO,
            dec!(100),
            &[],
            &ReplayTotals::default(),
        );
        assert_eq!(report.total_return_pct, 0.0);
        assert_eq!(report.win_rate, 0.0);
    }
}
