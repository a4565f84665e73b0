use crate::application::backtest::metrics::{BacktestReport, MetricsCalculator, ReplayTotals};
use crate::application::backtest::simulator::OrderSimulator;
use crate::application::backtest::tracker::PositionTracker;
use crate::domain::errors::ValidationError;
use crate::domain::market::Candle;
use crate::domain::strategy::{
    AdvisorConfig, GridAdvisor, OpenAdviceStrategy, TrendConfig,
};
use crate::domain::trading::PositionSummary;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::{debug, warn};

/// Most recent history candles handed to the advisor per tick.
const ADVICE_HISTORY_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_balance: Decimal,
    pub fee_rate: Decimal,
    pub slippage: Decimal,
    pub inst_id: String,
    pub take_profit_rate_min: Decimal,
    pub take_profit_rate_max: Decimal,
    pub position_size: Decimal,
    pub break_even_min: Decimal,
    pub break_even_max: Decimal,
    pub enable_trend_filter: bool,
    pub enable_red_candle_filter: bool,
    pub enable_auto_funding: bool,
    pub auto_funding_amount: Decimal,
    /// Candles without an open before funds are injected.
    pub auto_funding_idle_threshold: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            fee_rate: dec!(0.001),
            slippage: Decimal::ZERO,
            inst_id: "ETH-USDT".to_string(),
            take_profit_rate_min: dec!(0.0015),
            take_profit_rate_max: dec!(0.003),
            position_size: dec!(100),
            break_even_min: dec!(1),
            break_even_max: dec!(20),
            enable_trend_filter: true,
            enable_red_candle_filter: true,
            enable_auto_funding: false,
            auto_funding_amount: dec!(1000),
            auto_funding_idle_threshold: 288,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Open,
    Close,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Open => write!(f, "OPEN"),
            TradeAction::Close => write!(f, "CLOSE"),
        }
    }
}

/// One row of the trade log. CLOSE rows carry the per-entry P&L pair for
/// diagnostics; the tracker keeps the per-average-cost realized figure.
#[derive(Debug, Clone)]
pub struct TradeLogEntry {
    pub trade_id: u64,
    pub time: i64,
    pub action: TradeAction,
    pub price: Decimal,
    pub position_size: Decimal,
    pub balance: Decimal,
    pub pnl_percent: Decimal,
    pub pnl: Decimal,
    pub fee: Decimal,
    pub reason: String,
    pub position_id: String,
}

#[derive(Debug, Clone)]
pub struct FundingRecord {
    pub time: i64,
    pub before: Decimal,
    pub after: Decimal,
    pub amount: Decimal,
    pub idle_candles: u32,
}

/// One break-even round: everything between two moments the book was empty.
#[derive(Debug, Clone)]
pub struct RoundRecord {
    pub round: u32,
    pub start_time: i64,
    pub end_time: i64,
    pub opens: u32,
    pub closes: u32,
    /// Gross per-average-cost P&L realized in the round.
    pub gross_pnl: Decimal,
    /// All fees paid in the round, open and close legs.
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub end_balance: Decimal,
    /// False for a trailing round cut off by the end of data.
    pub completed: bool,
}

/// Deterministic single-threaded replay of the grid strategy over a candle
/// sequence. Uses the same advisor the live service runs; only candle
/// timestamps enter the math.
pub struct BacktestEngine {
    config: BacktestConfig,
    advisor: GridAdvisor,
    simulator: OrderSimulator,
    metrics: MetricsCalculator,
    tracker: PositionTracker,
    balance: Decimal,
    snapshots: Vec<Decimal>,
    trade_log: Vec<TradeLogEntry>,
    funding_log: Vec<FundingRecord>,
    rounds: Vec<RoundRecord>,
    totals: ReplayTotals,
    // Current-round accumulators feeding the advisor's position summary.
    round_realized_gross: Decimal,
    round_fees: Decimal,
    round_opens: u32,
    round_closes: u32,
    round_start_time: i64,
    idle_candles: u32,
    next_trade_id: u64,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Result<Self, ValidationError> {
        let advisor = GridAdvisor::new(AdvisorConfig {
            inst_id: config.inst_id.clone(),
            position_size: config.position_size,
            fee_rate: config.fee_rate,
            take_profit_rate_min: config.take_profit_rate_min,
            take_profit_rate_max: config.take_profit_rate_max,
            break_even_min: config.break_even_min,
            break_even_max: config.break_even_max,
            trend: TrendConfig::default(),
            enable_trend_filter: config.enable_trend_filter,
            enable_red_candle_filter: config.enable_red_candle_filter,
        })?;
        let simulator = OrderSimulator::new(config.fee_rate, config.slippage);
        let metrics = MetricsCalculator::new(config.initial_balance, config.fee_rate);
        let balance = config.initial_balance;

        Ok(Self {
            config,
            advisor,
            simulator,
            metrics,
            tracker: PositionTracker::new(),
            balance,
            snapshots: Vec::new(),
            trade_log: Vec::new(),
            funding_log: Vec::new(),
            rounds: Vec::new(),
            totals: ReplayTotals::default(),
            round_realized_gross: Decimal::ZERO,
            round_fees: Decimal::ZERO,
            round_opens: 0,
            round_closes: 0,
            round_start_time: 0,
            idle_candles: 0,
            next_trade_id: 1,
        })
    }

    pub fn run(&mut self, candles: &[Candle]) -> BacktestReport {
        self.snapshots.push(self.balance);

        for (i, candle) in candles.iter().enumerate() {
            self.close_pass(candle);

            let advice = {
                let summary = self.position_summary();
                let history_start = i.saturating_sub(ADVICE_HISTORY_LEN);
                let history = &candles[history_start..i];
                let last_candle = if i > 0 { &candles[i - 1] } else { candle };
                self.advisor
                    .get_open_advice(candle.close, candle, last_candle, history, &summary)
            };

            let mut opened = false;
            if advice.should_open
                && self.balance
                    >= self.config.position_size * (Decimal::ONE + self.config.fee_rate)
            {
                opened = self.open_pass(&advice, candle);
            } else if advice.should_open {
                debug!(
                    balance = %self.balance,
                    "open advice skipped: balance below size + fee"
                );
            }

            if self.config.enable_auto_funding {
                self.funding_pass(opened, candle.timestamp);
            }
        }

        // Trailing activity becomes an unfinished round; open positions stay
        // open and are marked at the last close.
        if self.round_opens > 0 || self.round_closes > 0 {
            let end_time = candles.last().map(|c| c.timestamp).unwrap_or(0);
            self.flush_round(end_time, false);
        }

        let mark_price = candles
            .last()
            .map(|c| c.close.value())
            .unwrap_or(Decimal::ZERO);
        self.metrics.calculate(
            &self.tracker,
            self.balance,
            mark_price,
            &self.snapshots,
            &self.totals,
        )
    }

    /// Closes every open position whose target the candle's high crossed;
    /// the target price is treated as a clean limit fill.
    fn close_pass(&mut self, candle: &Candle) {
        let filled: Vec<_> = self
            .tracker
            .open_positions()
            .iter()
            .filter(|p| candle.high.value() >= p.target_close_price)
            .cloned()
            .collect();

        for position in filled {
            let result = match self.simulator.simulate_close(
                &position,
                position.target_close_price,
                candle.timestamp,
                self.tracker.average_cost(),
            ) {
                Ok(result) => result,
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "close rejected");
                    continue;
                }
            };
            if let Err(e) = self.tracker.close_position(
                &position.id,
                position.target_close_price,
                candle.timestamp,
                result.realized_pnl,
            ) {
                warn!(position_id = %position.id, error = %e, "close skipped");
                continue;
            }

            self.balance += result.revenue;
            self.snapshots.push(self.balance);

            self.totals.total_profit_gross_avg += result.pnl_amount_avg;
            self.totals.total_profit_gross_entry += result.pnl_amount;
            self.totals.total_fees_close += result.close_fee;
            self.round_realized_gross += result.pnl_amount_avg;
            self.round_fees += result.close_fee;
            self.round_closes += 1;

            self.log_trade(TradeLogEntry {
                trade_id: self.next_trade_id,
                time: candle.timestamp,
                action: TradeAction::Close,
                price: position.target_close_price,
                position_size: position.size,
                balance: self.balance,
                pnl_percent: result.pnl_percent,
                pnl: result.pnl_amount,
                fee: result.close_fee,
                reason: "target_reached".to_string(),
                position_id: position.id.clone(),
            });

            if self.tracker.open_positions().is_empty() {
                self.flush_round(candle.timestamp, true);
            }
        }
    }

    fn open_pass(&mut self, advice: &crate::domain::strategy::OpenAdvice, candle: &Candle) -> bool {
        let fill = match self
            .simulator
            .simulate_open(advice, self.balance, candle.timestamp)
        {
            Ok(fill) => fill,
            Err(e) => {
                warn!(error = %e, "open rejected");
                return false;
            }
        };

        if self.round_opens == 0 && self.round_closes == 0 {
            self.round_start_time = candle.timestamp;
        }

        let position = self.tracker.add_position(
            fill.entry_price,
            fill.size,
            fill.open_time,
            fill.target_close_price,
        );
        self.balance -= fill.cost;
        self.snapshots.push(self.balance);

        self.totals.total_opened_trades += 1;
        self.totals.total_fees_open += fill.fee;
        self.round_fees += fill.fee;
        self.round_opens += 1;

        self.log_trade(TradeLogEntry {
            trade_id: self.next_trade_id,
            time: candle.timestamp,
            action: TradeAction::Open,
            price: fill.entry_price,
            position_size: fill.size,
            balance: self.balance,
            pnl_percent: Decimal::ZERO,
            pnl: Decimal::ZERO,
            fee: fill.fee,
            reason: advice.reason.clone(),
            position_id: position.id,
        });
        true
    }

    fn funding_pass(&mut self, opened: bool, timestamp: i64) {
        if opened {
            self.idle_candles = 0;
            return;
        }
        self.idle_candles += 1;
        if self.idle_candles >= self.config.auto_funding_idle_threshold {
            let before = self.balance;
            self.balance += self.config.auto_funding_amount;
            self.funding_log.push(FundingRecord {
                time: timestamp,
                before,
                after: self.balance,
                amount: self.config.auto_funding_amount,
                idle_candles: self.idle_candles,
            });
            self.idle_candles = 0;
        }
    }

    fn position_summary(&self) -> PositionSummary {
        PositionSummary {
            count: self.tracker.open_positions().len(),
            total_size: self.tracker.total_size(),
            avg_price: self.tracker.average_cost(),
            fees_paid: self.round_fees,
            realized_pnl: self.round_realized_gross,
        }
    }

    fn flush_round(&mut self, end_time: i64, completed: bool) {
        if self.round_opens == 0 && self.round_closes == 0 {
            return;
        }
        self.rounds.push(RoundRecord {
            round: self.rounds.len() as u32 + 1,
            start_time: self.round_start_time,
            end_time,
            opens: self.round_opens,
            closes: self.round_closes,
            gross_pnl: self.round_realized_gross,
            fees: self.round_fees,
            net_pnl: self.round_realized_gross - self.round_fees,
            end_balance: self.balance,
            completed,
        });
        self.round_realized_gross = Decimal::ZERO;
        self.round_fees = Decimal::ZERO;
        self.round_opens = 0;
        self.round_closes = 0;
        self.round_start_time = 0;
    }

    fn log_trade(&mut self, entry: TradeLogEntry) {
        self.next_trade_id += 1;
        self.trade_log.push(entry);
    }

    pub fn trade_log(&self) -> &[TradeLogEntry] {
        &self.trade_log
    }

    pub fn funding_log(&self) -> &[FundingRecord] {
        &self.funding_log
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn total_fees_paid(&self) -> Decimal {
        self.totals.total_fees_open + self.totals.total_fees_close
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }
}
