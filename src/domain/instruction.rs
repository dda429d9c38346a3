//! Trade instructions produced by the agent chain.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInstruction {
    #[serde(rename = "type")]
    pub side: Side,
    pub symbol: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TradeInstruction {
    pub fn new(side: Side, symbol: &str, amount: f64) -> Self {
        TradeInstruction {
            side,
            symbol: symbol.to_string(),
            amount,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

impl fmt::Display for TradeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.amount, self.symbol)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Why one element of the executor's trade list was discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstructionRejection {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid trade type {0}")]
    InvalidSide(String),

    #[error("symbol {0} is not a priced trading pair")]
    UnknownSymbol(String),

    #[error("invalid amount {0}")]
    InvalidAmount(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedInstruction {
    pub index: usize,
    pub raw: String,
    pub reason: InstructionRejection,
}

/// Where the accepted instructions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    ExecutorJson,
    ExecutorText,
    TradingPlanText,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSource::ExecutorJson => write!(f, "executor JSON"),
            PlanSource::ExecutorText => write!(f, "executor text"),
            PlanSource::TradingPlanText => write!(f, "trading plan text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub source: PlanSource,
    pub instructions: Vec<TradeInstruction>,
    pub rejected: Vec<RejectedInstruction>,
}

impl ParsedPlan {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
