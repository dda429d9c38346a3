//! Paper wallet: cash balance, open positions and trade history.
//!
//! Every mutating operation either applies completely or returns a
//! [`TradeRejection`] and leaves the wallet untouched, so the balance and all
//! position amounts stay non-negative no matter what the agents ask for.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::TradeRejection;
use super::market::PriceMap;
use super::metrics::PerformanceSummary;
use super::position::{Position, Side, Trade};

pub const DEFAULT_INITIAL_BALANCE: f64 = 20.0;
pub const DEFAULT_TARGET_BALANCE: f64 = 100_000.0;
pub const DEFAULT_MIN_PURCHASE: f64 = 5.0;

/// Remaining amount, relative to the amount held before a sell, below which
/// the position counts as closed.
const DUST_RATIO: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub at: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: f64,
    pub initial_balance: f64,
    pub target_balance: f64,
    pub min_purchase_amount: f64,
    pub positions: BTreeMap<String, Position>,
    pub trade_history: Vec<Trade>,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
    #[serde(default)]
    seeded: bool,
}

fn check_inputs(amount: f64, price: f64) -> Result<(), TradeRejection> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(TradeRejection::InvalidAmount(amount));
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(TradeRejection::InvalidPrice(price));
    }
    Ok(())
}

impl Wallet {
    pub fn new(initial_balance: f64, target_balance: f64) -> Self {
        Wallet {
            balance: initial_balance,
            initial_balance,
            target_balance,
            min_purchase_amount: DEFAULT_MIN_PURCHASE,
            positions: BTreeMap::new(),
            trade_history: Vec::new(),
            equity_curve: Vec::new(),
            seeded: false,
        }
    }

    pub fn with_min_purchase(mut self, min_purchase_amount: f64) -> Self {
        self.min_purchase_amount = min_purchase_amount;
        self
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// One-time opening purchase of `fraction` of the cash balance in `symbol`.
    pub fn seed_position(
        &mut self,
        symbol: &str,
        price: f64,
        fraction: f64,
        at: DateTime<Utc>,
    ) -> Result<Trade, TradeRejection> {
        if self.seeded {
            return Err(TradeRejection::AlreadySeeded);
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(TradeRejection::InvalidPrice(price));
        }
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(TradeRejection::InvalidAmount(fraction));
        }
        if self.balance < self.min_purchase_amount {
            return Err(TradeRejection::BelowMinimum {
                total: self.balance,
                minimum: self.min_purchase_amount,
            });
        }

        let total = self.balance * fraction;
        let amount = total / price;
        self.balance -= total;
        self.positions
            .insert(symbol.to_string(), Position::new(symbol, amount, price));

        let trade = Trade {
            timestamp: at,
            symbol: symbol.to_string(),
            side: Side::Buy,
            amount,
            price,
            total,
            profit_loss: None,
        };
        self.trade_history.push(trade.clone());
        self.seeded = true;
        Ok(trade)
    }

    pub fn buy(
        &mut self,
        symbol: &str,
        amount: f64,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Trade, TradeRejection> {
        check_inputs(amount, price)?;

        let total = amount * price;
        if total < self.min_purchase_amount {
            return Err(TradeRejection::BelowMinimum {
                total,
                minimum: self.min_purchase_amount,
            });
        }
        if total > self.balance {
            return Err(TradeRejection::InsufficientBalance {
                required: total,
                available: self.balance,
            });
        }

        self.balance -= total;
        match self.positions.get_mut(symbol) {
            Some(position) => position.average_in(amount, price),
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::new(symbol, amount, price));
            }
        }

        let trade = Trade {
            timestamp: at,
            symbol: symbol.to_string(),
            side: Side::Buy,
            amount,
            price,
            total,
            profit_loss: None,
        };
        self.trade_history.push(trade.clone());
        Ok(trade)
    }

    pub fn sell(
        &mut self,
        symbol: &str,
        amount: f64,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Trade, TradeRejection> {
        check_inputs(amount, price)?;

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| TradeRejection::NoPosition(symbol.to_string()))?;

        let held = position.amount;
        if amount > held * (1.0 + DUST_RATIO) {
            return Err(TradeRejection::InsufficientPosition {
                symbol: symbol.to_string(),
                requested: amount,
                held,
            });
        }

        let amount = amount.min(held);
        let total = amount * price;
        let profit_loss = amount * (price - position.entry_price);

        position.amount -= amount;
        if position.amount <= held * DUST_RATIO {
            self.positions.remove(symbol);
        }
        self.balance += total;

        let trade = Trade {
            timestamp: at,
            symbol: symbol.to_string(),
            side: Side::Sell,
            amount,
            price,
            total,
            profit_loss: Some(profit_loss),
        };
        self.trade_history.push(trade.clone());
        Ok(trade)
    }

    /// Sell the whole position in `symbol`.
    pub fn close_position(
        &mut self,
        symbol: &str,
        price: f64,
        at: DateTime<Utc>,
    ) -> Result<Trade, TradeRejection> {
        let amount = self
            .positions
            .get(symbol)
            .map(|p| p.amount)
            .ok_or_else(|| TradeRejection::NoPosition(symbol.to_string()))?;
        self.sell(symbol, amount, price, at)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position_value(&self, symbol: &str, price: f64) -> f64 {
        self.positions
            .get(symbol)
            .map(|p| p.market_value(price))
            .unwrap_or(0.0)
    }

    /// Cash plus the market value of every priced position. Positions without a
    /// price contribute nothing.
    pub fn total_value(&self, prices: &PriceMap) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter_map(|pos| prices.get(&pos.symbol).map(|&price| pos.market_value(price)))
            .sum();
        self.balance + position_value
    }

    /// Progress from the initial balance towards the target, as a percentage
    /// clamped to 0..=100.
    pub fn progress_to_target(&self, prices: &PriceMap) -> f64 {
        let value = self.total_value(prices);
        let span = self.target_balance - self.initial_balance;
        if span <= 0.0 {
            return if value >= self.target_balance { 100.0 } else { 0.0 };
        }
        ((value - self.initial_balance) / span * 100.0).clamp(0.0, 100.0)
    }

    pub fn target_reached(&self, prices: &PriceMap) -> bool {
        self.total_value(prices) >= self.target_balance
    }

    pub fn record_equity(&mut self, at: DateTime<Utc>, equity: f64) {
        self.equity_curve.push(EquityPoint { at, equity });
    }

    /// Number of fills recorded on the given UTC calendar day.
    pub fn trades_on(&self, day: NaiveDate) -> usize {
        self.trade_history
            .iter()
            .filter(|t| t.timestamp.date_naive() == day)
            .count()
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        PerformanceSummary::compute(&self.trade_history, &self.equity_curve)
    }
}
