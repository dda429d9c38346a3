//! Market data port trait.

use crate::domain::error::TraderError;
use crate::domain::market::Ticker24h;

pub trait MarketPort {
    fn current_price(&self, symbol: &str) -> Result<f64, TraderError>;

    fn stats_24h(&self, symbol: &str) -> Result<Ticker24h, TraderError>;
}
