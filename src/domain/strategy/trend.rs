use crate::domain::market::Candle;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

/// Tuning for the multi-signal open gate. Percentages are fractions
/// (0.005 = 0.5%).
#[derive(Debug, Clone)]
pub struct TrendConfig {
    /// EMA divergence beyond which the regime is a strong trend.
    pub ema_threshold: f64,
    /// Largest tolerated single-candle move against the entry side.
    pub candle_threshold: f64,
    pub short_period: usize,
    pub long_period: usize,
    /// Largest tolerated cumulative drop over `drop_window` candles.
    pub drop_threshold: f64,
    pub drop_window: usize,
    pub bearish_window: usize,
    /// Fraction of `bearish_window` candles that must be bearish to block.
    pub bearish_fraction: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            ema_threshold: 0.005,
            candle_threshold: 0.006,
            short_period: 20,
            long_period: 50,
            drop_threshold: 0.008,
            drop_window: 10,
            bearish_window: 5,
            bearish_fraction: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendState {
    StrongUptrend,
    StrongDowntrend,
    Ranging,
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::StrongUptrend => write!(f, "STRONG_UPTREND"),
            TrendState::StrongDowntrend => write!(f, "STRONG_DOWNTREND"),
            TrendState::Ranging => write!(f, "RANGING"),
        }
    }
}

/// Numbers the gate inspected, exposed for logging only.
#[derive(Debug, Clone)]
pub struct TrendInfo {
    pub ema_short: f64,
    pub ema_long: f64,
    /// (ema_short - ema_long) / ema_long, percent.
    pub ema_diff_pct: f64,
    /// Latest candle close-vs-open move, percent.
    pub candle_change_pct: f64,
    /// Close-to-close change over the last 20 candles, percent.
    pub cumulative_change_pct: f64,
    pub bearish_count: usize,
    pub can_long: bool,
    pub can_short: bool,
    pub status: TrendState,
}

/// Gates open advice on recent confirmed-candle history. History slices are
/// chronological, oldest first.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// SMA-seeded exponential moving average over closing prices. Returns
    /// `None` when fewer than `period` samples are available.
    fn ema(closes: &[f64], period: usize) -> Option<f64> {
        if period == 0 || closes.len() < period {
            return None;
        }
        let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
        let k = 2.0 / (period as f64 + 1.0);
        let ema = closes[period..]
            .iter()
            .fold(seed, |ema, close| close * k + ema * (1.0 - k));
        Some(ema)
    }

    fn closes(history: &[Candle]) -> Vec<f64> {
        history
            .iter()
            .map(|c| c.close.value().to_f64().unwrap_or(0.0))
            .collect()
    }

    fn latest_change(history: &[Candle]) -> f64 {
        match history.last() {
            Some(candle) => {
                let open = candle.open.value().to_f64().unwrap_or(0.0);
                let close = candle.close.value().to_f64().unwrap_or(0.0);
                if open > 0.0 { (close - open) / open } else { 0.0 }
            }
            None => 0.0,
        }
    }

    fn cumulative_change(closes: &[f64], window: usize) -> f64 {
        if window < 2 || closes.len() < window {
            return 0.0;
        }
        let first = closes[closes.len() - window];
        let last = closes[closes.len() - 1];
        if first > 0.0 { (last - first) / first } else { 0.0 }
    }

    fn bearish_count(history: &[Candle], window: usize) -> usize {
        let start = history.len().saturating_sub(window);
        history[start..].iter().filter(|c| c.is_bearish()).count()
    }

    /// EMA regime for the given history; `Ranging` while the long EMA has
    /// too few samples.
    pub fn trend_state(&self, history: &[Candle]) -> TrendState {
        let closes = Self::closes(history);
        let (Some(short), Some(long)) = (
            Self::ema(&closes, self.config.short_period),
            Self::ema(&closes, self.config.long_period),
        ) else {
            return TrendState::Ranging;
        };
        if long == 0.0 {
            return TrendState::Ranging;
        }
        let diff = (short - long) / long;
        if diff > self.config.ema_threshold {
            TrendState::StrongUptrend
        } else if diff < -self.config.ema_threshold {
            TrendState::StrongDowntrend
        } else {
            TrendState::Ranging
        }
    }

    /// Whether a long open is allowed. All guards must pass; the reason
    /// names the first failing one. Histories shorter than the long EMA
    /// period are treated as permissive.
    pub fn can_open_long(&self, history: &[Candle]) -> (bool, String) {
        if history.len() < self.config.long_period {
            return (true, "insufficient_history".to_string());
        }

        let latest_change = Self::latest_change(history);
        if latest_change < -self.config.candle_threshold {
            return (
                false,
                format!("single_candle_drop: change={:.4}%", latest_change * 100.0),
            );
        }

        let closes = Self::closes(history);
        let cumulative = Self::cumulative_change(&closes, self.config.drop_window);
        if cumulative < -self.config.drop_threshold {
            return (
                false,
                format!(
                    "cumulative_drop: change={:.4}% over {} candles",
                    cumulative * 100.0,
                    self.config.drop_window
                ),
            );
        }

        let bearish = Self::bearish_count(history, self.config.bearish_window);
        let cutoff =
            (self.config.bearish_fraction * self.config.bearish_window as f64).ceil() as usize;
        if bearish >= cutoff {
            return (
                false,
                format!(
                    "consecutive_bearish: {}/{} candles",
                    bearish, self.config.bearish_window
                ),
            );
        }

        let state = self.trend_state(history);
        if state == TrendState::StrongDowntrend {
            return (false, format!("trend_state: {state}"));
        }

        (true, "ok".to_string())
    }

    /// Mirror of `can_open_long` for the short side: rejects a latest candle
    /// rising beyond the threshold or a strong uptrend regime.
    pub fn can_open_short(&self, history: &[Candle]) -> (bool, String) {
        if history.len() < self.config.long_period {
            return (true, "insufficient_history".to_string());
        }

        let latest_change = Self::latest_change(history);
        if latest_change > self.config.candle_threshold {
            return (
                false,
                format!("single_candle_rise: change={:.4}%", latest_change * 100.0),
            );
        }

        let state = self.trend_state(history);
        if state == TrendState::StrongUptrend {
            return (false, format!("trend_state: {state}"));
        }

        (true, "ok".to_string())
    }

    /// Diagnostic snapshot of everything the guards looked at.
    pub fn trend_info(&self, history: &[Candle]) -> TrendInfo {
        let closes = Self::closes(history);
        let ema_short = Self::ema(&closes, self.config.short_period).unwrap_or(0.0);
        let ema_long = Self::ema(&closes, self.config.long_period).unwrap_or(0.0);
        let ema_diff_pct = if ema_long > 0.0 {
            (ema_short - ema_long) / ema_long * 100.0
        } else {
            0.0
        };
        let (can_long, _) = self.can_open_long(history);
        let (can_short, _) = self.can_open_short(history);
        TrendInfo {
            ema_short,
            ema_long,
            ema_diff_pct,
            candle_change_pct: Self::latest_change(history) * 100.0,
            cumulative_change_pct: Self::cumulative_change(&closes, 20) * 100.0,
            bearish_count: Self::bearish_count(history, self.config.bearish_window),
            can_long,
            can_short,
            status: self.trend_state(history),
        }
    }
}
