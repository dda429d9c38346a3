//! Binance public spot market data.
//!
//! Only unsigned ticker endpoints are used. Binance quotes numbers as strings,
//! so every numeric field is parsed here before it reaches the domain.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::error::TraderError;
use crate::domain::market::Ticker24h;
use crate::domain::rate_limit::RateLimiter;
use crate::ports::market_port::MarketPort;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);
pub const API_KEY_ENV: &str = "BINANCE_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub min_interval: Duration,
    /// Sent as `X-MBX-APIKEY` when present; public endpoints work without it.
    pub api_key: Option<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            min_interval: DEFAULT_MIN_INTERVAL,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hRaw {
    symbol: String,
    price_change: String,
    price_change_percent: String,
    volume: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

fn market_error(symbol: &str, reason: impl Into<String>) -> TraderError {
    TraderError::Market {
        symbol: symbol.to_string(),
        reason: reason.into(),
    }
}

fn parse_number(symbol: &str, field: &str, raw: &str) -> Result<f64, TraderError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| market_error(symbol, format!("{field} '{raw}' is not a number")))
}

fn parse_price(symbol: &str, body: &str) -> Result<f64, TraderError> {
    let ticker: TickerPrice = serde_json::from_str(body)
        .map_err(|e| market_error(symbol, format!("malformed price response: {e}")))?;
    parse_number(symbol, "price", &ticker.price)
}

fn parse_ticker_24h(symbol: &str, body: &str) -> Result<Ticker24h, TraderError> {
    let raw: Ticker24hRaw = serde_json::from_str(body)
        .map_err(|e| market_error(symbol, format!("malformed 24h ticker response: {e}")))?;
    Ok(Ticker24h {
        price_change: parse_number(symbol, "priceChange", &raw.price_change)?,
        price_change_percent: parse_number(symbol, "priceChangePercent", &raw.price_change_percent)?,
        volume: parse_number(symbol, "volume", &raw.volume)?,
        quote_volume: parse_number(symbol, "quoteVolume", &raw.quote_volume)?,
        symbol: raw.symbol,
    })
}

/// Binance returns `{"code": -1121, "msg": "Invalid symbol."}` on failure.
fn error_reason(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<BinanceErrorBody>(body) {
        Ok(err) => format!("{} (code {})", err.msg, err.code),
        Err(_) => format!("HTTP {status}"),
    }
}

pub struct BinanceClient {
    client: Client,
    config: MarketConfig,
    limiter: Mutex<RateLimiter>,
}

impl BinanceClient {
    pub fn new(config: MarketConfig) -> Result<Self, TraderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| market_error("*", format!("cannot build HTTP client: {e}")))?;
        let limiter = Mutex::new(RateLimiter::new(config.min_interval));
        Ok(BinanceClient {
            client,
            config,
            limiter,
        })
    }

    fn get(&self, path: &str, symbol: &str) -> Result<String, TraderError> {
        self.limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .acquire();

        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url).query(&[("symbol", symbol)]);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request
            .send()
            .map_err(|e| market_error(symbol, format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| market_error(symbol, format!("reading response failed: {e}")))?;

        if !status.is_success() {
            return Err(market_error(symbol, error_reason(status, &body)));
        }
        Ok(body)
    }
}

impl MarketPort for BinanceClient {
    fn current_price(&self, symbol: &str) -> Result<f64, TraderError> {
        let body = self.get("/api/v3/ticker/price", symbol)?;
        parse_price(symbol, &body)
    }

    fn stats_24h(&self, symbol: &str) -> Result<Ticker24h, TraderError> {
        let body = self.get("/api/v3/ticker/24hr", symbol)?;
        parse_ticker_24h(symbol, &body)
    }
}
