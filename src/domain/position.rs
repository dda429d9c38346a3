//! Open positions and the trade records the wallet keeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown trade side '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub amount: f64,
    pub entry_price: f64,
}

impl Position {
    pub fn new(symbol: &str, amount: f64, entry_price: f64) -> Self {
        Position {
            symbol: symbol.to_string(),
            amount,
            entry_price,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.amount * price
    }

    pub fn cost_basis(&self) -> f64 {
        self.amount * self.entry_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.amount * (price - self.entry_price)
    }

    /// Percentage move of `price` relative to the entry price.
    pub fn change_pct(&self, price: f64) -> f64 {
        if self.entry_price > 0.0 {
            (price - self.entry_price) / self.entry_price * 100.0
        } else {
            0.0
        }
    }

    /// Add to the position, moving the entry price to the volume-weighted average.
    pub fn average_in(&mut self, amount: f64, price: f64) {
        let total_amount = self.amount + amount;
        if total_amount > 0.0 {
            self.entry_price = (self.cost_basis() + amount * price) / total_amount;
        }
        self.amount = total_amount;
    }
}

/// One executed fill. `profit_loss` is only set on sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub amount: f64,
    pub price: f64,
    pub total: f64,
    pub profit_loss: Option<f64>,
}
