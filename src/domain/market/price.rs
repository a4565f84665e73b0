use crate::domain::errors::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A strictly positive market price.
///
/// Construction is the only way to obtain a `Price`, so any value observed
/// downstream is guaranteed positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice(value));
        }
        Ok(Self(value))
    }

    /// Parses a decimal string (the wire representation) into a price.
    pub fn parse(raw: &str, field: &'static str) -> Result<Self, ValidationError> {
        let value = Decimal::from_str(raw).map_err(|_| ValidationError::InvalidDecimal {
            field,
            value: raw.to_string(),
        })?;
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
