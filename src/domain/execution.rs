//! Applying trade instructions to the paper wallet.
//!
//! Fills happen at the current market price with no slippage or commission.
//! A rejected or skipped instruction is recorded in the report and never stops
//! the rest of the batch.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::error::TradeRejection;
use super::instruction::TradeInstruction;
use super::market::PriceMap;
use super::position::{Side, Trade};
use super::wallet::Wallet;

pub const DEFAULT_MAX_TRADES_PER_DAY: usize = 5000;

/// Guards applied on top of the wallet's own checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionLimits {
    pub max_trades_per_day: usize,
    /// Largest fraction of portfolio value one buy may cost. 0 disables.
    pub max_risk_per_trade: f64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_trades_per_day: DEFAULT_MAX_TRADES_PER_DAY,
            max_risk_per_trade: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Executed(Trade),
    Rejected(TradeRejection),
    /// No current price for the symbol.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub instruction: TradeInstruction,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
}

impl ExecutionReport {
    pub fn executed(&self) -> impl Iterator<Item = &Trade> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ExecutionOutcome::Executed(trade) => Some(trade),
            _ => None,
        })
    }

    pub fn executed_count(&self) -> usize {
        self.executed().count()
    }

    pub fn rejected_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ExecutionOutcome::Rejected(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome == ExecutionOutcome::Skipped)
            .count()
    }
}

fn check_limits(
    wallet: &Wallet,
    instruction: &TradeInstruction,
    price: f64,
    prices: &PriceMap,
    at: DateTime<Utc>,
    limits: &ExecutionLimits,
) -> Result<(), TradeRejection> {
    if wallet.trades_on(at.date_naive()) >= limits.max_trades_per_day {
        return Err(TradeRejection::DailyLimitReached(limits.max_trades_per_day));
    }
    if instruction.side == Side::Buy && limits.max_risk_per_trade > 0.0 {
        let total = instruction.amount * price;
        let limit = wallet.total_value(prices) * limits.max_risk_per_trade;
        if total > limit {
            return Err(TradeRejection::ExceedsRiskLimit { total, limit });
        }
    }
    Ok(())
}

/// Apply each instruction in order at the current price.
pub fn execute_instructions(
    wallet: &mut Wallet,
    instructions: &[TradeInstruction],
    prices: &PriceMap,
    at: DateTime<Utc>,
    limits: &ExecutionLimits,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for instruction in instructions {
        let outcome = match prices.get(&instruction.symbol) {
            None => {
                warn!(symbol = %instruction.symbol, "no price, skipping instruction");
                ExecutionOutcome::Skipped
            }
            Some(&price) => {
                let applied = check_limits(wallet, instruction, price, prices, at, limits)
                    .and_then(|()| match instruction.side {
                        Side::Buy => wallet.buy(&instruction.symbol, instruction.amount, price, at),
                        Side::Sell => wallet.sell(&instruction.symbol, instruction.amount, price, at),
                    });
                match applied {
                    Ok(trade) => {
                        info!(
                            side = %trade.side,
                            symbol = %trade.symbol,
                            amount = trade.amount,
                            price = trade.price,
                            total = trade.total,
                            "trade executed"
                        );
                        ExecutionOutcome::Executed(trade)
                    }
                    Err(rejection) => {
                        warn!(instruction = %instruction, reason = %rejection, "trade rejected");
                        ExecutionOutcome::Rejected(rejection)
                    }
                }
            }
        };
        report.results.push(ExecutionResult {
            instruction: instruction.clone(),
            outcome,
        });
    }

    report
}

/// Stop-loss and take-profit thresholds, in percent of the entry price.
/// A value of 0 disables that rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitRules {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl ExitRules {
    pub fn is_disabled(&self) -> bool {
        self.stop_loss_pct <= 0.0 && self.take_profit_pct <= 0.0
    }

    fn triggered(&self, entry_price: f64, price: f64) -> bool {
        let stop = self.stop_loss_pct > 0.0 && price <= entry_price * (1.0 - self.stop_loss_pct / 100.0);
        let take = self.take_profit_pct > 0.0 && price >= entry_price * (1.0 + self.take_profit_pct / 100.0);
        stop || take
    }
}

/// Close every position whose stop-loss or take-profit is hit.
///
/// Two passes: collect triggered symbols first, then close each one, so the
/// position map is never mutated while it is being walked.
pub fn check_exits(
    wallet: &mut Wallet,
    prices: &PriceMap,
    at: DateTime<Utc>,
    rules: &ExitRules,
) -> Vec<Trade> {
    if rules.is_disabled() {
        return Vec::new();
    }

    let triggered: Vec<(String, f64)> = wallet
        .positions
        .values()
        .filter_map(|pos| {
            let price = *prices.get(&pos.symbol)?;
            rules
                .triggered(pos.entry_price, price)
                .then(|| (pos.symbol.clone(), price))
        })
        .collect();

    let mut closed = Vec::with_capacity(triggered.len());
    for (symbol, price) in triggered {
        match wallet.close_position(&symbol, price, at) {
            Ok(trade) => {
                info!(%symbol, price, pnl = trade.profit_loss, "exit rule closed position");
                closed.push(trade);
            }
            Err(e) => warn!(%symbol, error = %e, "exit rule could not close position"),
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn prices(pairs: &[(&str, f64)]) -> PriceMap {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    fn buy(symbol: &str, amount: f64) -> TradeInstruction {
        TradeInstruction::new(Side::Buy, symbol, amount)
    }

    fn sell(symbol: &str, amount: f64) -> TradeInstruction {
        TradeInstruction::new(Side::Sell, symbol, amount)
    }

    #[test]
    fn executes_in_order() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        let p = prices(&[("ETHUSDT", 10.0)]);
        let report = execute_instructions(
            &mut wallet,
            &[buy("ETHUSDT", 2.0), sell("ETHUSDT", 1.0)],
            &p,
            at(),
            &ExecutionLimits::default(),
        );
        assert_eq!(report.executed_count(), 2);
        assert_relative_eq!(wallet.balance, 90.0);
        assert_relative_eq!(wallet.get_position("ETHUSDT").unwrap().amount, 1.0);
    }

    #[test]
    fn rejection_does_not_stop_the_batch() {
        let mut wallet = Wallet::new(20.0, 1000.0);
        let p = prices(&[("ETHUSDT", 10.0), ("BTCUSDT", 100.0)]);
        let report = execute_instructions(
            &mut wallet,
            &[sell("BTCUSDT", 1.0), buy("ETHUSDT", 100.0), buy("ETHUSDT", 1.0)],
            &p,
            at(),
            &ExecutionLimits::default(),
        );
        assert_eq!(report.rejected_count(), 2);
        assert_eq!(report.executed_count(), 1);
        assert!(matches!(
            report.results[0].outcome,
            ExecutionOutcome::Rejected(TradeRejection::NoPosition(_))
        ));
        assert!(matches!(
            report.results[1].outcome,
            ExecutionOutcome::Rejected(TradeRejection::InsufficientBalance { .. })
        ));
        assert_relative_eq!(wallet.balance, 10.0);
    }

    #[test]
    fn unpriced_symbol_is_skipped() {
        let mut wallet = Wallet::new(20.0, 1000.0);
        let report = execute_instructions(
            &mut wallet,
            &[buy("SOLUSDT", 1.0)],
            &prices(&[("ETHUSDT", 10.0)]),
            at(),
            &ExecutionLimits::default(),
        );
        assert_eq!(report.skipped_count(), 1);
        assert_relative_eq!(wallet.balance, 20.0);
    }

    #[test]
    fn daily_limit_counts_existing_trades() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        let p = prices(&[("ETHUSDT", 10.0)]);
        let limits = ExecutionLimits {
            max_trades_per_day: 2,
            max_risk_per_trade: 0.0,
        };
        let report = execute_instructions(
            &mut wallet,
            &[buy("ETHUSDT", 1.0), buy("ETHUSDT", 1.0), buy("ETHUSDT", 1.0)],
            &p,
            at(),
            &limits,
        );
        assert_eq!(report.executed_count(), 2);
        assert_eq!(
            report.results[2].outcome,
            ExecutionOutcome::Rejected(TradeRejection::DailyLimitReached(2))
        );

        let tomorrow = at() + chrono::Duration::days(1);
        let report = execute_instructions(&mut wallet, &[buy("ETHUSDT", 1.0)], &p, tomorrow, &limits);
        assert_eq!(report.executed_count(), 1);
    }

    #[test]
    fn risk_limit_caps_buys_only() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        let p = prices(&[("ETHUSDT", 10.0)]);
        let limits = ExecutionLimits {
            max_trades_per_day: 100,
            max_risk_per_trade: 0.1,
        };
        let report = execute_instructions(
            &mut wallet,
            &[buy("ETHUSDT", 2.0), buy("ETHUSDT", 1.0), sell("ETHUSDT", 1.0)],
            &p,
            at(),
            &limits,
        );
        assert!(matches!(
            report.results[0].outcome,
            ExecutionOutcome::Rejected(TradeRejection::ExceedsRiskLimit { .. })
        ));
        assert_eq!(report.executed_count(), 2);
        assert!(!wallet.has_position("ETHUSDT"));
    }

    #[test]
    fn stop_loss_and_take_profit() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        let entry = prices(&[("ETHUSDT", 10.0), ("BTCUSDT", 100.0), ("SOLUSDT", 20.0)]);
        execute_instructions(
            &mut wallet,
            &[buy("ETHUSDT", 1.0), buy("BTCUSDT", 0.1), buy("SOLUSDT", 1.0)],
            &entry,
            at(),
            &ExecutionLimits::default(),
        );

        let now = prices(&[("ETHUSDT", 9.4), ("BTCUSDT", 116.0), ("SOLUSDT", 19.5)]);
        let rules = ExitRules {
            stop_loss_pct: 5.0,
            take_profit_pct: 15.0,
        };
        let closed = check_exits(&mut wallet, &now, at(), &rules);

        let symbols: Vec<&str> = closed.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert!(wallet.has_position("SOLUSDT"));
        assert_eq!(wallet.position_count(), 1);
        assert_relative_eq!(closed[1].profit_loss.unwrap(), -0.6, epsilon = 1e-9);
    }

    #[test]
    fn disabled_rules_close_nothing() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        wallet.buy("ETHUSDT", 1.0, 10.0, at()).unwrap();
        let crash = prices(&[("ETHUSDT", 1.0)]);
        assert!(check_exits(&mut wallet, &crash, at(), &ExitRules::default()).is_empty());
        assert!(wallet.has_position("ETHUSDT"));
    }

    #[test]
    fn unpriced_positions_are_left_alone() {
        let mut wallet = Wallet::new(100.0, 1000.0);
        wallet.buy("ETHUSDT", 1.0, 10.0, at()).unwrap();
        let rules = ExitRules {
            stop_loss_pct: 5.0,
            take_profit_pct: 0.0,
        };
        assert!(check_exits(&mut wallet, &PriceMap::new(), at(), &rules).is_empty());
    }
}
