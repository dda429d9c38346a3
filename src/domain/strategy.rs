//! Trading strategy personas fed into every agent prompt.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

pub const DEFAULT_STRATEGY: &str = "conservative";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingStrategy {
    pub key: String,
    pub name: String,
    pub description: String,
    pub risk_level: RiskLevel,
    /// Target return on a successful trade, in percent.
    pub target_return: f64,
}

fn strategy(
    key: &str,
    name: &str,
    risk_level: RiskLevel,
    target_return: f64,
    traits: &[&str],
    summary: &str,
) -> TradingStrategy {
    let mut description = format!("{summary}\nKey characteristics:");
    for t in traits {
        description.push_str("\n- ");
        description.push_str(t);
    }
    TradingStrategy {
        key: key.to_string(),
        name: name.to_string(),
        description,
        risk_level,
        target_return,
    }
}

fn aggressive() -> TradingStrategy {
    strategy(
        "aggressive",
        "Maximum Returns",
        RiskLevel::High,
        1000.0,
        &[
            "Takes larger positions in volatile assets",
            "Uses leverage when available",
            "Focuses on momentum and trend following",
            "Quick entry and exit from positions",
            "Embraces meme coins and high-volatility tokens",
            "Uses social sentiment for trading signals",
            "Maintains minimal USDT reserves",
            "Targets 1000%+ returns on successful trades",
            "Aims for 100x portfolio growth",
        ],
        "Aggressive strategy focused on maximizing returns through high-risk, high-reward trades.",
    )
}

fn balanced() -> TradingStrategy {
    strategy(
        "balanced",
        "Balanced Growth",
        RiskLevel::Medium,
        500.0,
        &[
            "Diversifies across multiple asset classes",
            "Takes calculated risks on promising projects",
            "Maintains moderate position sizes",
            "Uses both technical and fundamental analysis",
            "Keeps some USDT for opportunities",
            "Targets 500%+ returns on successful trades",
            "Aims for 50x portfolio growth",
        ],
        "Balanced strategy that combines aggressive and conservative approaches.",
    )
}

fn conservative() -> TradingStrategy {
    strategy(
        "conservative",
        "Safe Growth",
        RiskLevel::Low,
        200.0,
        &[
            "Focuses on established cryptocurrencies",
            "Takes smaller, well-researched positions",
            "Uses strict stop-losses",
            "Emphasizes fundamental analysis",
            "Maintains higher USDT reserves",
            "Targets 200%+ returns on successful trades",
            "Aims for 20x portfolio growth",
        ],
        "Conservative strategy focused on steady growth with controlled risk.",
    )
}

pub fn builtin_strategies() -> Vec<TradingStrategy> {
    vec![aggressive(), balanced(), conservative()]
}

pub fn find_strategy(key: &str) -> Option<TradingStrategy> {
    let key = key.trim().to_lowercase();
    builtin_strategies().into_iter().find(|s| s.key == key)
}

/// Look up `key`, falling back to the conservative strategy when unknown.
pub fn resolve_strategy(key: &str) -> TradingStrategy {
    find_strategy(key).unwrap_or_else(|| {
        warn!(requested = key, fallback = DEFAULT_STRATEGY, "unknown strategy");
        conservative()
    })
}
