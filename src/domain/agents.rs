//! The six agent roles and the prompts each one is given.
//!
//! Every role sees the same system preamble (its job, the strategy name and
//! the strategy description) and a user message built from the market
//! snapshot plus whatever the earlier roles said. Later roles build on earlier
//! outputs, so [`AgentRole::ALL`] is the order the pipeline walks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write};

use super::market::{PriceMap, Ticker24h};
use super::strategy::TradingStrategy;
use crate::ports::llm_port::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketAnalyst,
    RiskManager,
    FinancialAdvisor,
    RiskAnalyzer,
    Trader,
    Executor,
}

impl AgentRole {
    pub const ALL: [AgentRole; 6] = [
        AgentRole::MarketAnalyst,
        AgentRole::RiskManager,
        AgentRole::FinancialAdvisor,
        AgentRole::RiskAnalyzer,
        AgentRole::Trader,
        AgentRole::Executor,
    ];

    pub fn title(self) -> &'static str {
        match self {
            AgentRole::MarketAnalyst => "Market Analyst",
            AgentRole::RiskManager => "Risk Manager",
            AgentRole::FinancialAdvisor => "Financial Advisor",
            AgentRole::RiskAnalyzer => "Risk Analyzer",
            AgentRole::Trader => "Trader",
            AgentRole::Executor => "Trade Executor",
        }
    }

    fn duties(self) -> &'static str {
        match self {
            AgentRole::MarketAnalyst => {
                "You are a professional cryptocurrency market analyst.\n\
                 Analyze the current market conditions and provide insights about potential trading opportunities.\n\
                 Focus on identifying trends, support/resistance levels, and market sentiment."
            }
            AgentRole::RiskManager => {
                "You are a risk management expert for cryptocurrency trading.\n\
                 Assess the risks associated with potential trades and provide risk management recommendations.\n\
                 Consider market volatility, portfolio exposure, and risk-reward ratios."
            }
            AgentRole::FinancialAdvisor => {
                "You are a financial advisor for a small cryptocurrency portfolio.\n\
                 Weigh the market analysis against the risk recommendations and advise how capital should be allocated.\n\
                 Keep the progress toward the portfolio target in view."
            }
            AgentRole::RiskAnalyzer => {
                "You are a risk analyzer reviewing proposed allocations before they reach the trader.\n\
                 Flag positions that are too large, too concentrated, or below the minimum purchase amount.\n\
                 State clearly which ideas should be dropped or resized."
            }
            AgentRole::Trader => {
                "You are a professional cryptocurrency trader.\n\
                 Create a detailed trading plan based on the analysis, advice and risk review.\n\
                 Specify exact amounts to buy or sell for each cryptocurrency."
            }
            AgentRole::Executor => {
                "You are a precise trade executor for cryptocurrency trading.\n\
                 Your role is to interpret the trading plan and execute trades exactly as specified."
            }
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One open position as the agents see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub amount: f64,
    pub entry_price: f64,
    pub current_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
}

/// Everything the agents are told about the market and the wallet this cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketSnapshot {
    pub prices: PriceMap,
    pub stats: BTreeMap<String, Ticker24h>,
    pub portfolio_value: f64,
    pub progress_to_target: f64,
    pub positions: Vec<PositionView>,
    pub available_balance: f64,
}

/// Replies collected from each role, filled in as the pipeline advances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutputs {
    pub market_analysis: String,
    pub risk_assessment: String,
    pub financial_advice: String,
    pub risk_analysis: String,
    pub trading_plan: String,
    pub execution_instructions: String,
}

impl AgentOutputs {
    pub fn get(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::MarketAnalyst => &self.market_analysis,
            AgentRole::RiskManager => &self.risk_assessment,
            AgentRole::FinancialAdvisor => &self.financial_advice,
            AgentRole::RiskAnalyzer => &self.risk_analysis,
            AgentRole::Trader => &self.trading_plan,
            AgentRole::Executor => &self.execution_instructions,
        }
    }

    pub fn set(&mut self, role: AgentRole, reply: String) {
        let slot = match role {
            AgentRole::MarketAnalyst => &mut self.market_analysis,
            AgentRole::RiskManager => &mut self.risk_assessment,
            AgentRole::FinancialAdvisor => &mut self.financial_advice,
            AgentRole::RiskAnalyzer => &mut self.risk_analysis,
            AgentRole::Trader => &mut self.trading_plan,
            AgentRole::Executor => &mut self.execution_instructions,
        };
        *slot = reply;
    }
}

const EXECUTOR_EXAMPLE: &str = r#"[
  {
    "type": "BUY",
    "symbol": "BTCUSDT",
    "amount": 0.001,
    "reason": "Buying BTC based on positive market analysis"
  }
]"#;

fn format_prices(snapshot: &MarketSnapshot) -> String {
    let mut out = String::new();
    for (symbol, price) in &snapshot.prices {
        let _ = write!(out, "- {symbol}: ${price}");
        if let Some(stats) = snapshot.stats.get(symbol) {
            let _ = write!(
                out,
                " (24h {:+.2}%, {}, volume {:.0})",
                stats.price_change_percent,
                stats.trend(),
                stats.quote_volume
            );
        }
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("(no prices available)\n");
    }
    out
}

fn format_positions(snapshot: &MarketSnapshot) -> String {
    if snapshot.positions.is_empty() {
        return "none".to_string();
    }
    let mut out = String::new();
    for p in &snapshot.positions {
        let _ = write!(out, "\n- {} {} @ entry ${:.6}", p.amount, p.symbol, p.entry_price);
        if let (Some(price), Some(pnl)) = (p.current_price, p.unrealized_pnl) {
            let _ = write!(out, ", now ${price}, unrealized P&L ${pnl:.2}");
        }
    }
    out
}

fn account_block(snapshot: &MarketSnapshot) -> String {
    format!(
        "Current positions: {}\nAvailable balance: ${:.2}",
        format_positions(snapshot),
        snapshot.available_balance
    )
}

fn system_prompt(role: AgentRole, strategy: &TradingStrategy, min_purchase: f64) -> String {
    let mut system = format!(
        "{}\nYou specialize in the {} strategy (risk level: {}).",
        role.duties(),
        strategy.name,
        strategy.risk_level
    );
    if role == AgentRole::Executor {
        let _ = write!(
            system,
            "\nYou must ensure all trades meet the minimum purchase amount of ${min_purchase}.\n\n\
             You MUST respond with a valid JSON array of trade actions. Each action must have these exact fields:\n\
             - type: \"BUY\" or \"SELL\"\n\
             - symbol: The trading pair (e.g., \"BTCUSDT\")\n\
             - amount: The exact amount to trade, as a number\n\
             - reason: A brief explanation of why this trade is being executed\n\n\
             Respond with [] when no trade should be made.\n\n\
             Example response format (copy this exactly):\n{EXECUTOR_EXAMPLE}"
        );
    }
    system.push_str("\n\n");
    system.push_str(&strategy.description);
    system
}

fn user_prompt(role: AgentRole, snapshot: &MarketSnapshot, outputs: &AgentOutputs) -> String {
    let account = account_block(snapshot);
    match role {
        AgentRole::MarketAnalyst => format!(
            "Current market prices:\n{}\nPortfolio value: ${:.2}\nProgress to target: {:.2}%\n{account}\n\n\
             Please analyze the market and provide your insights.",
            format_prices(snapshot),
            snapshot.portfolio_value,
            snapshot.progress_to_target,
        ),
        AgentRole::RiskManager => format!(
            "Market Analysis:\n{}\n\n{account}\n\nPlease assess the risks and provide recommendations.",
            outputs.market_analysis
        ),
        AgentRole::FinancialAdvisor => format!(
            "Market Analysis:\n{}\n\nRisk Assessment:\n{}\n\nPortfolio value: ${:.2}\nProgress to target: {:.2}%\n{account}\n\n\
             Please advise how the available capital should be allocated.",
            outputs.market_analysis,
            outputs.risk_assessment,
            snapshot.portfolio_value,
            snapshot.progress_to_target,
        ),
        AgentRole::RiskAnalyzer => format!(
            "Financial Advice:\n{}\n\nRisk Assessment:\n{}\n\n{account}\n\n\
             Please review the proposed allocation and flag anything that should change.",
            outputs.financial_advice, outputs.risk_assessment
        ),
        AgentRole::Trader => format!(
            "Market Analysis:\n{}\n\nRisk Assessment:\n{}\n\nFinancial Advice:\n{}\n\nRisk Review:\n{}\n\n{account}\n\n\
             Please create a detailed trading plan with specific actions.",
            outputs.market_analysis,
            outputs.risk_assessment,
            outputs.financial_advice,
            outputs.risk_analysis,
        ),
        AgentRole::Executor => format!(
            "Trading Plan:\n{}\n\nCurrent prices:\n{}\n{account}\n\n\
             Please execute the trades exactly as specified in the plan. Remember to respond with a valid JSON array.",
            outputs.trading_plan,
            format_prices(snapshot),
        ),
    }
}

pub fn render_prompt(
    role: AgentRole,
    strategy: &TradingStrategy,
    snapshot: &MarketSnapshot,
    outputs: &AgentOutputs,
    min_purchase: f64,
) -> Prompt {
    Prompt {
        role,
        system: system_prompt(role, strategy, min_purchase),
        user: user_prompt(role, snapshot, outputs),
    }
}
