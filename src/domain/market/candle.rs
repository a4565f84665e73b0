use crate::domain::errors::ValidationError;
use crate::domain::market::price::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An OHLC candle with validated prices. `high >= low` is enforced at
/// construction; individual prices are positive by the `Price` invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    /// Bar open time, unix milliseconds.
    pub timestamp: i64,
}

impl Candle {
    pub fn new(
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        timestamp: i64,
    ) -> Result<Self, ValidationError> {
        if high.value() < low.value() {
            return Err(ValidationError::HighBelowLow {
                high: high.value(),
                low: low.value(),
            });
        }
        Ok(Self {
            open,
            high,
            low,
            close,
            timestamp,
        })
    }

    /// Convenience constructor from raw decimals.
    pub fn from_values(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        timestamp: i64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            Price::new(open)?,
            Price::new(high)?,
            Price::new(low)?,
            Price::new(close)?,
            timestamp,
        )
    }

    /// Lower edge of the candle body.
    pub fn body_low(&self) -> Decimal {
        self.open.value().min(self.close.value())
    }

    /// Upper edge of the candle body.
    pub fn body_high(&self) -> Decimal {
        self.open.value().max(self.close.value())
    }

    /// Midpoint between the body low and the wick low.
    pub fn mid_low(&self) -> Decimal {
        (self.body_low() + self.low.value()) / Decimal::TWO
    }

    pub fn is_bullish(&self) -> bool {
        self.close.value() > self.open.value()
    }

    pub fn is_bearish(&self) -> bool {
        self.close.value() < self.open.value()
    }
}

/// A normalized candle stream event as received from the upstream and stored
/// in the KV store. Numeric fields stay exact decimal strings through ingest;
/// they are parsed only when computation needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleEvent {
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub bar: String,
    /// Bar open time, unix milliseconds, as a decimal string.
    pub ts: String,
    pub o: String,
    pub h: String,
    pub l: String,
    pub c: String,
    #[serde(default)]
    pub vol: String,
    #[serde(default, rename = "volCcy")]
    pub vol_ccy: String,
    #[serde(default, rename = "volCcyQuote")]
    pub vol_ccy_quote: String,
    /// "1" once the upstream has sealed the bar, "0" while in progress.
    #[serde(default)]
    pub confirm: String,
}

impl CandleEvent {
    pub fn confirmed(&self) -> bool {
        self.confirm == "1"
    }

    pub fn ts_millis(&self) -> Result<i64, ValidationError> {
        i64::from_str(&self.ts).map_err(|_| ValidationError::InvalidDecimal {
            field: "ts",
            value: self.ts.clone(),
        })
    }

    /// Parses the event into the validated `Candle` value object.
    pub fn to_candle(&self) -> Result<Candle, ValidationError> {
        Candle::new(
            Price::parse(&self.o, "o")?,
            Price::parse(&self.h, "h")?,
            Price::parse(&self.l, "l")?,
            Price::parse(&self.c, "c")?,
            self.ts_millis()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::from_values(o, h, l, c, 0).unwrap()
    }

    #[test]
    fn test_rejects_high_below_low() {
        let err = Candle::from_values(dec!(100), dec!(99), dec!(101), dec!(100), 0).unwrap_err();
        assert!(matches!(err, ValidationError::HighBelowLow { .. }));
    }

    #[test]
    fn test_rejects_non_positive_components() {
        assert!(Candle::from_values(dec!(0), dec!(1), dec!(1), dec!(1), 0).is_err());
        assert!(Candle::from_values(dec!(1), dec!(1), dec!(-1), dec!(1), 0).is_err());
    }

    #[test]
    fn test_body_and_mid_low() {
        // body_low = min(open, close) = 2490, mid_low = (2490 + 2470) / 2
        let c = candle(dec!(2490), dec!(2510), dec!(2470), dec!(2500));
        assert_eq!(c.body_low(), dec!(2490));
        assert_eq!(c.body_high(), dec!(2500));
        assert_eq!(c.mid_low(), dec!(2480));
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
    }

    #[test]
    fn test_doji_is_neither_bullish_nor_bearish() {
        let c = candle(dec!(100), dec!(101), dec!(99), dec!(100));
        assert!(!c.is_bullish());
        assert!(!c.is_bearish());
    }

    #[test]
    fn test_event_confirmation_and_parse() {
        let event = CandleEvent {
            inst_id: "ETH-USDT".to_string(),
            bar: "5m".to_string(),
            ts: "1700000000000".to_string(),
            o: "2490".to_string(),
            h: "2510".to_string(),
            l: "2470".to_string(),
            c: "2500".to_string(),
            vol: "12.5".to_string(),
            vol_ccy: "31200".to_string(),
            vol_ccy_quote: "31200".to_string(),
            confirm: "1".to_string(),
        };
        assert!(event.confirmed());

        let parsed = event.to_candle().unwrap();
        assert_eq!(parsed.timestamp, 1_700_000_000_000);
        assert_eq!(parsed.close.value(), dec!(2500));

        let mut unconfirmed = event.clone();
        unconfirmed.confirm = "0".to_string();
        assert!(!unconfirmed.confirmed());
    }

    #[test]
    fn test_event_surfaces_bad_decimal() {
        let event = CandleEvent {
            inst_id: "ETH-USDT".to_string(),
            bar: "5m".to_string(),
            ts: "1700000000000".to_string(),
            o: "oops".to_string(),
            h: "2510".to_string(),
            l: "2470".to_string(),
            c: "2500".to_string(),
            vol: String::new(),
            vol_ccy: String::new(),
            vol_ccy_quote: String::new(),
            confirm: "1".to_string(),
        };
        assert!(matches!(
            event.to_candle().unwrap_err(),
            ValidationError::InvalidDecimal { field: "o", .. }
        ));
    }

    #[test]
    fn test_event_json_roundtrip_uses_wire_names() {
        let event = CandleEvent {
            inst_id: "BTC-USDT".to_string(),
            bar: "1m".to_string(),
            ts: "1700000000000".to_string(),
            o: "42000.1".to_string(),
            h: "42010".to_string(),
            l: "41990".to_string(),
            c: "42005".to_string(),
            vol: "1".to_string(),
            vol_ccy: "42000".to_string(),
            vol_ccy_quote: "42000".to_string(),
            confirm: "0".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"instId\""));
        assert!(json.contains("\"volCcyQuote\""));
        let back: CandleEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
