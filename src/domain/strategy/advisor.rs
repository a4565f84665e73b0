use crate::domain::errors::ValidationError;
use crate::domain::market::{Candle, Price};
use crate::domain::strategy::trend::{TrendAnalyzer, TrendConfig};
use crate::domain::trading::PositionSummary;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Discount applied below the current price when quoting an open.
const OPEN_DISCOUNT: Decimal = dec!(0.001);

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub inst_id: String,
    /// Nominal position size, quote currency.
    pub position_size: Decimal,
    pub fee_rate: Decimal,
    pub take_profit_rate_min: Decimal,
    pub take_profit_rate_max: Decimal,
    pub break_even_min: Decimal,
    pub break_even_max: Decimal,
    pub trend: TrendConfig,
    pub enable_trend_filter: bool,
    pub enable_red_candle_filter: bool,
}

impl AdvisorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.take_profit_rate_min > self.take_profit_rate_max {
            return Err(ValidationError::InvalidDecimal {
                field: "take_profit_rate_min",
                value: format!(
                    "{} > max {}",
                    self.take_profit_rate_min, self.take_profit_rate_max
                ),
            });
        }
        if self.break_even_min > self.break_even_max {
            return Err(ValidationError::InvalidDecimal {
                field: "break_even_min",
                value: format!("{} > max {}", self.break_even_min, self.break_even_max),
            });
        }
        if self.position_size <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(self.position_size));
        }
        Ok(())
    }
}

/// The advisor's verdict for one evaluation tick. Prices travel as exact
/// decimal strings so a downstream order path sees deterministic ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAdvice {
    pub should_open: bool,
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub current_price: String,
    pub open_price: String,
    pub close_price: String,
    pub position_size: Decimal,
    pub take_profit_rate: Decimal,
    pub reason: String,
}

/// Minimal strategy seam: everything the engine and the advisory service
/// need from a strategy. Swapping in a DCA or trend-following strategy means
/// implementing this and nothing else.
pub trait OpenAdviceStrategy: Send + Sync {
    fn get_open_advice(
        &self,
        current_price: Price,
        current_candle: &Candle,
        last_candle: &Candle,
        history: &[Candle],
        summary: &PositionSummary,
    ) -> OpenAdvice;
}

/// Grid strategy advisor: trend filter, break-even exit, red-candle filter,
/// then a discounted open with a fixed take-profit ladder. Pure — identical
/// inputs always produce identical advice.
pub struct GridAdvisor {
    config: AdvisorConfig,
    trend: TrendAnalyzer,
}

impl GridAdvisor {
    pub fn new(config: AdvisorConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let trend = TrendAnalyzer::new(config.trend.clone());
        Ok(Self { config, trend })
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    fn no_open(&self, current_price: Decimal, reason: String) -> OpenAdvice {
        OpenAdvice {
            should_open: false,
            inst_id: self.config.inst_id.clone(),
            current_price: current_price.to_string(),
            open_price: String::new(),
            close_price: String::new(),
            position_size: Decimal::ZERO,
            take_profit_rate: Decimal::ZERO,
            reason,
        }
    }
}

impl OpenAdviceStrategy for GridAdvisor {
    fn get_open_advice(
        &self,
        current_price: Price,
        current_candle: &Candle,
        _last_candle: &Candle,
        history: &[Candle],
        summary: &PositionSummary,
    ) -> OpenAdvice {
        let price = current_price.value();

        if self.config.enable_trend_filter && !history.is_empty() {
            let (allowed, _) = self.trend.can_open_long(history);
            if !allowed {
                let info = self.trend.trend_info(history);
                return self.no_open(
                    price,
                    format!(
                        "trend_filter_blocked: trend={}, ema_diff={:.4}, candle_change={:.4}",
                        info.status, info.ema_diff_pct, info.candle_change_pct
                    ),
                );
            }
        }

        if !summary.is_empty() {
            let (should_exit, expected) = summary.should_break_even(
                price,
                self.config.fee_rate,
                self.config.break_even_min,
                self.config.break_even_max,
            );
            if should_exit {
                return self.no_open(
                    price,
                    format!(
                        "break_even_exit: expected_profit={:.2} (target: {}-{})",
                        expected, self.config.break_even_min, self.config.break_even_max
                    ),
                );
            }
        }

        if self.config.enable_red_candle_filter
            && !summary.is_empty()
            && summary.avg_price > price
            && !current_candle.is_bearish()
        {
            return self.no_open(
                price,
                format!(
                    "red_candle_filter: loss_state_green_candle (avg={}, price={})",
                    summary.avg_price, price
                ),
            );
        }

        // 0.1% below market, truncated to the tick; take-profit ceiling so
        // the target never rounds below the configured rate.
        let open_price = (price * (Decimal::ONE - OPEN_DISCOUNT)).trunc_with_scale(2);
        let close_price = (open_price * (Decimal::ONE + self.config.take_profit_rate_min))
            .round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity);

        OpenAdvice {
            should_open: true,
            inst_id: self.config.inst_id.clone(),
            current_price: price.to_string(),
            open_price: format!("{open_price:.2}"),
            close_price: format!("{close_price:.2}"),
            position_size: self.config.position_size,
            take_profit_rate: self.config.take_profit_rate_min,
            reason: "simulated_advice".to_string(),
        }
    }
}
