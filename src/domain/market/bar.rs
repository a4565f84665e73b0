use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Candle timeframe labels recognized by the upstream candle channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Bar {
    OneSec,
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Bar {
    /// The wire label, also used in storage keys and channel names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bar::OneSec => "1s",
            Bar::OneMin => "1m",
            Bar::ThreeMin => "3m",
            Bar::FiveMin => "5m",
            Bar::FifteenMin => "15m",
            Bar::ThirtyMin => "30m",
            Bar::OneHour => "1H",
            Bar::TwoHour => "2H",
            Bar::FourHour => "4H",
            Bar::OneDay => "1D",
            Bar::OneWeek => "1W",
            Bar::OneMonth => "1M",
        }
    }

    /// TTL applied to the latest-candle key for this bar. Intraday bars keep
    /// roughly two bar-widths; everything else falls back to one minute.
    pub fn latest_ttl(&self) -> Duration {
        let secs = match self {
            Bar::OneSec => 2,
            Bar::OneMin => 120,
            Bar::ThreeMin => 360,
            Bar::FiveMin => 600,
            Bar::FifteenMin => 1800,
            Bar::ThirtyMin => 3600,
            Bar::OneHour => 7200,
            Bar::TwoHour => 14400,
            Bar::FourHour => 28800,
            _ => 60,
        };
        Duration::from_secs(secs)
    }

    /// TTL for a raw bar label; unknown labels get the one-minute fallback.
    pub fn latest_ttl_for_label(label: &str) -> Duration {
        Bar::from_str(label)
            .map(|bar| bar.latest_ttl())
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn all() -> Vec<Bar> {
        vec![
            Bar::OneSec,
            Bar::OneMin,
            Bar::ThreeMin,
            Bar::FiveMin,
            Bar::FifteenMin,
            Bar::ThirtyMin,
            Bar::OneHour,
            Bar::TwoHour,
            Bar::FourHour,
            Bar::OneDay,
            Bar::OneWeek,
            Bar::OneMonth,
        ]
    }
}

impl FromStr for Bar {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1s" => Ok(Bar::OneSec),
            "1m" => Ok(Bar::OneMin),
            "3m" => Ok(Bar::ThreeMin),
            "5m" => Ok(Bar::FiveMin),
            "15m" => Ok(Bar::FifteenMin),
            "30m" => Ok(Bar::ThirtyMin),
            "1H" => Ok(Bar::OneHour),
            "2H" => Ok(Bar::TwoHour),
            "4H" => Ok(Bar::FourHour),
            "1D" => Ok(Bar::OneDay),
            "1W" => Ok(Bar::OneWeek),
            "1M" => Ok(Bar::OneMonth),
            _ => Err(anyhow!(
                "Invalid bar label: '{}'. Valid labels: 1s 1m 3m 5m 15m 30m 1H 2H 4H 1D 1W 1M",
                s
            )),
        }
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Bar> for String {
    fn from(bar: Bar) -> Self {
        bar.as_str().to_string()
    }
}

impl TryFrom<String> for Bar {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Bar::from_str(&value).map_err(|e| e.to_string())
    }
}
