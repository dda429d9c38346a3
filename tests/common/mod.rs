#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use papertrader::domain::agents::AgentRole;
use papertrader::domain::error::TraderError;
use papertrader::domain::market::Ticker24h;
use papertrader::domain::session::SessionConfig;
use papertrader::ports::llm_port::{LlmPort, Prompt};
use papertrader::ports::market_port::MarketPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockMarket {
    pub prices: RefCell<HashMap<String, f64>>,
    pub errors: HashMap<String, String>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self {
            prices: RefCell::new(HashMap::new()),
            errors: HashMap::new(),
        }
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.prices.borrow_mut().insert(symbol.to_string(), price);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.borrow_mut().insert(symbol.to_string(), price);
    }
}

impl MarketPort for MockMarket {
    fn current_price(&self, symbol: &str) -> Result<f64, TraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(TraderError::Market {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        self.prices
            .borrow()
            .get(symbol)
            .copied()
            .ok_or_else(|| TraderError::Market {
                symbol: symbol.to_string(),
                reason: "Invalid symbol. (code -1121)".into(),
            })
    }

    fn stats_24h(&self, symbol: &str) -> Result<Ticker24h, TraderError> {
        let _ = self.current_price(symbol)?;
        Ok(Ticker24h {
            symbol: symbol.to_string(),
            price_change: 2.0,
            price_change_percent: 2.5,
            volume: 1_000.0,
            quote_volume: 50_000.0,
        })
    }
}

/// Replies from a per-role queue; an empty queue answers with `fallback`.
pub struct ScriptedLlm {
    pub replies: RefCell<HashMap<AgentRole, Vec<String>>>,
    pub prompts: RefCell<Vec<Prompt>>,
    pub fallback: String,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            replies: RefCell::new(HashMap::new()),
            prompts: RefCell::new(Vec::new()),
            fallback: "No strong view.".to_string(),
        }
    }

    /// Queue replies for `role`, returned in the given order.
    pub fn with_replies(self, role: AgentRole, replies: &[&str]) -> Self {
        self.replies
            .borrow_mut()
            .insert(role, replies.iter().rev().map(|r| r.to_string()).collect());
        self
    }

    pub fn calls_for(&self, role: AgentRole) -> usize {
        self.prompts.borrow().iter().filter(|p| p.role == role).count()
    }
}

impl LlmPort for ScriptedLlm {
    fn complete(&self, prompt: &Prompt) -> Result<String, TraderError> {
        self.prompts.borrow_mut().push(prompt.clone());
        let reply = self
            .replies
            .borrow_mut()
            .get_mut(&prompt.role)
            .and_then(|queue| queue.pop());
        Ok(reply.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub struct FailingLlm;

impl LlmPort for FailingLlm {
    fn complete(&self, _prompt: &Prompt) -> Result<String, TraderError> {
        Err(TraderError::LlmExhausted {
            attempts: 3,
            reason: "503 Service Unavailable".into(),
        })
    }
}

pub fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn session_config(pairs: &[&str], max_cycles: u64) -> SessionConfig {
    SessionConfig {
        trading_pairs: pairs.iter().map(|p| p.to_string()).collect(),
        max_cycles,
        ..SessionConfig::default()
    }
}
