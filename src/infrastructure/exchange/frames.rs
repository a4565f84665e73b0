use crate::domain::errors::ValidationError;
use crate::domain::market::{CandleEvent, Ticker};
use serde::{Deserialize, Serialize};

/// Channel prefix for candle subscriptions; the bar label follows it.
pub const CANDLE_CHANNEL_PREFIX: &str = "candle";
pub const TICKERS_CHANNEL: &str = "tickers";

/// Subscription argument, shared by requests and the upstream envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

impl ChannelArg {
    pub fn tickers(inst_id: &str) -> Self {
        Self {
            channel: TICKERS_CHANNEL.to_string(),
            inst_id: inst_id.to_string(),
        }
    }

    pub fn candles(inst_id: &str, bar: &str) -> Self {
        Self {
            channel: format!("{CANDLE_CHANNEL_PREFIX}{bar}"),
            inst_id: inst_id.to_string(),
        }
    }
}

/// Outgoing subscribe/unsubscribe request.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub op: &'static str,
    pub args: Vec<ChannelArg>,
}

impl SubscribeRequest {
    pub fn subscribe(arg: ChannelArg) -> Self {
        Self {
            op: "subscribe",
            args: vec![arg],
        }
    }

    pub fn unsubscribe(arg: ChannelArg) -> Self {
        Self {
            op: "unsubscribe",
            args: vec![arg],
        }
    }
}

/// Incoming frame envelope. Event frames carry `event`/`code`/`msg`; data
/// frames carry `arg` and `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub event: Option<String>,
    pub code: Option<String>,
    pub msg: Option<String>,
    pub arg: Option<ChannelArg>,
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// Acks report success with code "0" or no code at all.
    pub fn ack_ok(&self) -> bool {
        match self.code.as_deref() {
            None | Some("") | Some("0") => true,
            Some(_) => false,
        }
    }
}

/// Parses the `data` field of a ticker frame. Extra fields on each element
/// are tolerated.
pub fn parse_tickers(data: serde_json::Value) -> Result<Vec<Ticker>, serde_json::Error> {
    serde_json::from_value(data)
}

/// Parses one positional candle row:
/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`.
pub fn parse_candle_row(
    row: &serde_json::Value,
    inst_id: &str,
    bar: &str,
) -> Result<CandleEvent, ValidationError> {
    let fields = row
        .as_array()
        .ok_or(ValidationError::MissingField("candle row"))?;
    if fields.len() < 9 {
        return Err(ValidationError::MissingField("candle row element"));
    }

    let field = |idx: usize, name: &'static str| -> Result<String, ValidationError> {
        let value = &fields[idx];
        if let Some(s) = value.as_str() {
            Ok(s.to_string())
        } else if value.is_number() {
            Ok(value.to_string())
        } else {
            Err(ValidationError::InvalidDecimal {
                field: name,
                value: value.to_string(),
            })
        }
    };

    Ok(CandleEvent {
        inst_id: inst_id.to_string(),
        bar: bar.to_string(),
        ts: field(0, "ts")?,
        o: field(1, "o")?,
        h: field(2, "h")?,
        l: field(3, "l")?,
        c: field(4, "c")?,
        vol: field(5, "vol")?,
        vol_ccy: field(6, "volCcy")?,
        vol_ccy_quote: field(7, "volCcyQuote")?,
        confirm: field(8, "confirm")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_request_shape() {
        let req = SubscribeRequest::subscribe(ChannelArg::candles("ETH-USDT", "5m"));
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"op":"subscribe","args":[{"channel":"candle5m","instId":"ETH-USDT"}]}"#
        );

        let req = SubscribeRequest::unsubscribe(ChannelArg::tickers("ETH-USDT"));
        assert!(serde_json::to_string(&req).unwrap().contains("\"unsubscribe\""));
    }

    #[test]
    fn test_envelope_ack() {
        let env: Envelope =
            serde_json::from_str(r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"X"}}"#)
                .unwrap();
        assert!(env.ack_ok());

        let env: Envelope =
            serde_json::from_str(r#"{"event":"error","code":"60012","msg":"bad request"}"#)
                .unwrap();
        assert!(!env.ack_ok());
        assert_eq!(env.event.as_deref(), Some("error"));
    }

    #[test]
    fn test_parse_candle_row() {
        let row = json!([
            "1700000000000",
            "2490",
            "2510",
            "2470",
            "2500",
            "12.5",
            "31200",
            "31200",
            "1"
        ]);
        let event = parse_candle_row(&row, "ETH-USDT", "5m").unwrap();
        assert_eq!(event.inst_id, "ETH-USDT");
        assert_eq!(event.bar, "5m");
        assert_eq!(event.c, "2500");
        assert!(event.confirmed());
    }

    #[test]
    fn test_short_candle_row_rejected() {
        let row = json!(["1700000000000", "2490", "2510", "2470", "2500"]);
        assert!(parse_candle_row(&row, "ETH-USDT", "5m").is_err());
    }

    #[test]
    fn test_numeric_candle_fields_tolerated() {
        let row = json!([1700000000000i64, 2490, 2510, 2470, 2500, 12.5, 31200, 31200, "0"]);
        let event = parse_candle_row(&row, "ETH-USDT", "1m").unwrap();
        assert_eq!(event.ts, "1700000000000");
        assert_eq!(event.o, "2490");
        assert!(!event.confirmed());
    }
}
