use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised when a value object or strategy input violates an invariant
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("candle high {high} is below low {low}")]
    HighBelowLow { high: Decimal, low: Decimal },

    #[error("invalid decimal in field '{field}': '{value}'")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Rejections produced by the backtest order simulator and position tracker.
/// These are returned as values to the engine, which logs and skips the step.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("advice does not request an open")]
    AdviceNotOpen,

    #[error("insufficient balance: need {need}, available {available}")]
    InsufficientBalance { need: Decimal, available: Decimal },

    #[error("close price must be positive, got {0}")]
    NonPositiveClosePrice(Decimal),

    #[error("average cost must be positive, got {0}")]
    NonPositiveAvgCost(Decimal),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("malformed advice price in '{field}': '{value}'")]
    MalformedAdvicePrice { field: &'static str, value: String },
}
