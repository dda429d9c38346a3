//! Market data as the rest of the domain sees it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest price per symbol, ordered so prompts and reports are stable.
pub type PriceMap = BTreeMap<String, f64>;

/// Rolling 24-hour statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Ticker24h {
    /// Direction word used in prompts and the `prices` report.
    pub fn trend(&self) -> &'static str {
        if self.price_change_percent > 0.0 {
            "up"
        } else if self.price_change_percent < 0.0 {
            "down"
        } else {
            "flat"
        }
    }
}
