use crate::domain::market::Bar;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "local" => Ok(Environment::Development),
            _ => anyhow::bail!(
                "Invalid ENVIRONMENT: {}. Must be 'production' or 'development'",
                s
            ),
        }
    }
}

/// Ingest service configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_addr: String,
    pub redis_password: String,
    pub redis_db: u8,
    pub redis_pool_size: u32,
    pub public_ws_url: String,
    pub business_ws_url: String,
    pub instruments: Vec<String>,
    pub ticker_enabled: bool,
    pub candle_bars: Vec<Bar>,
    pub log_level: String,
    pub environment: Environment,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let instruments: Vec<String> = env_or("INSTRUMENTS", "ETH-USDT")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if instruments.is_empty() {
            anyhow::bail!("INSTRUMENTS must name at least one instrument");
        }

        let candle_bars: Vec<Bar> = env_or("CANDLE_BARS", "5m")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Bar::from_str(s).with_context(|| format!("invalid CANDLE_BARS entry '{s}'")))
            .collect::<Result<_>>()?;

        let public_ws_url = env_or("PUBLIC_WS_URL", "wss://ws.okx.com:8443/ws/v5/public");
        let business_ws_url = env_or("BUSINESS_WS_URL", "wss://ws.okx.com:8443/ws/v5/business");
        for raw in [&public_ws_url, &business_ws_url] {
            Url::parse(raw).with_context(|| format!("invalid websocket url '{raw}'"))?;
        }

        Ok(Self {
            redis_addr: env_or("REDIS_ADDR", "127.0.0.1:6379"),
            redis_password: env_or("REDIS_PASSWORD", ""),
            redis_db: env_or("REDIS_DB", "0")
                .parse()
                .context("invalid REDIS_DB")?,
            redis_pool_size: env_or("REDIS_POOL_SIZE", "10")
                .parse()
                .context("invalid REDIS_POOL_SIZE")?,
            public_ws_url,
            business_ws_url,
            instruments,
            ticker_enabled: env_or("TICKER_ENABLED", "true")
                .parse()
                .context("invalid TICKER_ENABLED")?,
            candle_bars,
            log_level: env_or("LOG_LEVEL", "info"),
            environment: env_or("ENVIRONMENT", "development").parse()?,
        })
    }

    /// Connection URL for the KV store and bus.
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}/{}", self.redis_addr, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}/{}",
                self.redis_password, self.redis_addr, self.redis_db
            )
        }
    }
}
