//! The trading loop: prices in, agent chain, trades out, repeat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use super::agents::{AgentOutputs, MarketSnapshot, PositionView};
use super::error::TraderError;
use super::execution::{
    ExecutionLimits, ExecutionOutcome, ExitRules, check_exits, execute_instructions,
};
use super::instruction::{PlanSource, TradeInstruction};
use super::market::{PriceMap, Ticker24h};
use super::pipeline::AgentPipeline;
use super::position::Trade;
use super::strategy::TradingStrategy;
use super::symbols::{default_trading_pairs, probe_pairs};
use super::wallet::Wallet;
use crate::ports::llm_port::LlmPort;
use crate::ports::market_port::MarketPort;
use crate::ports::state_port::StatePort;

pub const DEFAULT_SEED_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_SEED_FRACTION: f64 = 0.5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub trading_pairs: Vec<String>,
    pub seed_symbol: String,
    pub seed_fraction: f64,
    pub interval: Duration,
    /// Cycles to attempt before stopping. 0 runs until the target is reached.
    pub max_cycles: u64,
    pub limits: ExecutionLimits,
    pub exits: ExitRules,
    /// Fetch 24h statistics for every priced pair and show them to the agents.
    pub include_stats: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            trading_pairs: default_trading_pairs(),
            seed_symbol: DEFAULT_SEED_SYMBOL.to_string(),
            seed_fraction: DEFAULT_SEED_FRACTION,
            interval: DEFAULT_INTERVAL,
            max_cycles: 0,
            limits: ExecutionLimits::default(),
            exits: ExitRules::default(),
            include_stats: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedTrade {
    pub instruction: TradeInstruction,
    pub reason: String,
}

/// What happened in one cycle. Also the `last_cycle` record of a saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub at: DateTime<Utc>,
    pub prices: PriceMap,
    #[serde(default)]
    pub skipped_pairs: Vec<String>,
    #[serde(default)]
    pub exits: Vec<Trade>,
    pub outputs: AgentOutputs,
    pub plan_source: PlanSource,
    pub instructions: Vec<TradeInstruction>,
    /// Executor entries thrown out before execution.
    pub discarded: usize,
    pub executed: Vec<Trade>,
    pub rejected: Vec<RejectedTrade>,
    pub portfolio_value: f64,
    pub progress_to_target: f64,
    pub target_reached: bool,
}

/// Everything persisted for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub strategy: String,
    pub wallet: Wallet,
    #[serde(default)]
    pub cycles_completed: u64,
    #[serde(default)]
    pub last_cycle: Option<CycleReport>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    CycleLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub cycles_attempted: u64,
    pub cycles_failed: u64,
    pub stop_reason: StopReason,
    pub final_value: f64,
    pub progress_to_target: f64,
}

pub struct TradingSession<'a> {
    market: &'a dyn MarketPort,
    llm: &'a dyn LlmPort,
    state: Option<&'a dyn StatePort>,
    strategy: TradingStrategy,
    config: SessionConfig,
    wallet: Wallet,
    cycles_completed: u64,
    last_prices: PriceMap,
    last_report: Option<CycleReport>,
}

impl<'a> TradingSession<'a> {
    pub fn new(
        market: &'a dyn MarketPort,
        llm: &'a dyn LlmPort,
        strategy: TradingStrategy,
        wallet: Wallet,
        config: SessionConfig,
    ) -> Self {
        TradingSession {
            market,
            llm,
            state: None,
            strategy,
            config,
            wallet,
            cycles_completed: 0,
            last_prices: PriceMap::new(),
            last_report: None,
        }
    }

    /// Save the session after every completed cycle.
    pub fn with_state(mut self, state: &'a dyn StatePort) -> Self {
        self.state = Some(state);
        self
    }

    /// Continue from a saved session: its wallet replaces the current one.
    pub fn resume_from(mut self, saved: SessionState) -> Self {
        if saved.strategy != self.strategy.key {
            warn!(
                saved = %saved.strategy,
                current = %self.strategy.key,
                "resuming a wallet saved under a different strategy"
            );
        }
        self.wallet = saved.wallet;
        self.cycles_completed = saved.cycles_completed;
        self.last_report = saved.last_cycle;
        self
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Make the one-time opening purchase. Does nothing for a wallet that is
    /// already seeded; a seed the wallet refuses is logged and skipped.
    pub fn initialize(&mut self, at: DateTime<Utc>) -> Result<Option<Trade>, TraderError> {
        if self.wallet.is_seeded() || self.config.seed_fraction <= 0.0 {
            return Ok(None);
        }
        let symbol = self.config.seed_symbol.clone();
        let price = self.market.current_price(&symbol)?;
        match self
            .wallet
            .seed_position(&symbol, price, self.config.seed_fraction, at)
        {
            Ok(trade) => {
                info!(%symbol, amount = trade.amount, price, total = trade.total, "seed position opened");
                Ok(Some(trade))
            }
            Err(rejection) => {
                warn!(%symbol, reason = %rejection, "seed purchase skipped");
                Ok(None)
            }
        }
    }

    fn fetch_stats(&self, prices: &PriceMap) -> BTreeMap<String, Ticker24h> {
        let mut stats = BTreeMap::new();
        if !self.config.include_stats {
            return stats;
        }
        for symbol in prices.keys() {
            match self.market.stats_24h(symbol) {
                Ok(t) => {
                    stats.insert(symbol.clone(), t);
                }
                Err(e) => debug!(%symbol, error = %e, "no 24h stats"),
            }
        }
        stats
    }

    fn snapshot(&self, prices: &PriceMap, stats: BTreeMap<String, Ticker24h>) -> MarketSnapshot {
        let positions = self
            .wallet
            .positions
            .values()
            .map(|p| {
                let current_price = prices.get(&p.symbol).copied();
                PositionView {
                    symbol: p.symbol.clone(),
                    amount: p.amount,
                    entry_price: p.entry_price,
                    current_price,
                    unrealized_pnl: current_price.map(|price| p.unrealized_pnl(price)),
                }
            })
            .collect();
        MarketSnapshot {
            prices: prices.clone(),
            stats,
            portfolio_value: self.wallet.total_value(prices),
            progress_to_target: self.wallet.progress_to_target(prices),
            positions,
            available_balance: self.wallet.balance,
        }
    }

    /// Run one full cycle at time `at`.
    pub fn run_cycle(&mut self, at: DateTime<Utc>) -> Result<CycleReport, TraderError> {
        let cycle = self.cycles_completed + 1;
        let _span = info_span!("cycle", cycle, strategy = %self.strategy.key).entered();

        let probe = probe_pairs(self.market, &self.config.trading_pairs)?;
        let prices = probe.prices;
        self.last_prices = prices.clone();

        let exits = check_exits(&mut self.wallet, &prices, at, &self.config.exits);
        let stats = self.fetch_stats(&prices);
        let snapshot = self.snapshot(&prices, stats);
        info!(
            pairs = prices.len(),
            portfolio_value = snapshot.portfolio_value,
            progress = snapshot.progress_to_target,
            "market snapshot"
        );

        let pipeline = AgentPipeline::new(self.llm, &self.strategy, self.wallet.min_purchase_amount);
        let outcome = match pipeline.run(&snapshot) {
            Ok(outcome) => outcome,
            Err(e) => {
                // Exit trades already moved the wallet; they must outlive the failed cycle.
                if !exits.is_empty() {
                    warn!(exits = exits.len(), error = %e, "agents failed after exit trades, saving wallet");
                    self.persist(at, self.last_report.as_ref());
                }
                return Err(e);
            }
        };

        let execution = execute_instructions(
            &mut self.wallet,
            &outcome.plan.instructions,
            &prices,
            at,
            &self.config.limits,
        );

        let portfolio_value = self.wallet.total_value(&prices);
        self.wallet.record_equity(at, portfolio_value);
        self.cycles_completed = cycle;

        let mut executed = Vec::new();
        let mut rejected = Vec::new();
        for result in execution.results {
            match result.outcome {
                ExecutionOutcome::Executed(trade) => executed.push(trade),
                ExecutionOutcome::Rejected(reason) => rejected.push(RejectedTrade {
                    instruction: result.instruction,
                    reason: reason.to_string(),
                }),
                ExecutionOutcome::Skipped => rejected.push(RejectedTrade {
                    instruction: result.instruction,
                    reason: "no current price".to_string(),
                }),
            }
        }

        let report = CycleReport {
            cycle,
            at,
            skipped_pairs: probe.skipped.into_iter().map(|s| s.symbol).collect(),
            exits,
            plan_source: outcome.plan.source,
            instructions: outcome.plan.instructions,
            discarded: outcome.plan.rejected.len(),
            outputs: outcome.outputs,
            executed,
            rejected,
            portfolio_value,
            progress_to_target: self.wallet.progress_to_target(&prices),
            target_reached: self.wallet.target_reached(&prices),
            prices,
        };
        info!(
            executed = report.executed.len(),
            rejected = report.rejected.len(),
            portfolio_value,
            "cycle complete"
        );

        self.persist(at, Some(&report));
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn persist(&self, at: DateTime<Utc>, last_cycle: Option<&CycleReport>) {
        let Some(port) = self.state else {
            return;
        };
        let state = SessionState {
            strategy: self.strategy.key.clone(),
            wallet: self.wallet.clone(),
            cycles_completed: self.cycles_completed,
            last_cycle: last_cycle.cloned(),
            last_updated: at,
        };
        if let Err(e) = port.save(&state) {
            warn!(error = %e, "could not save session state");
        }
    }

    /// Loop until the target is reached or `max_cycles` cycles have been
    /// attempted. A failed cycle is logged and counted, never fatal. `sleep`
    /// receives the pause between cycles; `on_cycle` sees every good cycle.
    pub fn run(
        &mut self,
        sleep: &mut dyn FnMut(Duration),
        on_cycle: &mut dyn FnMut(&CycleReport),
    ) -> SessionSummary {
        let mut attempted = 0u64;
        let mut failed = 0u64;

        let stop_reason = loop {
            if self.config.max_cycles > 0 && attempted >= self.config.max_cycles {
                break StopReason::CycleLimit;
            }
            attempted += 1;

            match self.run_cycle(Utc::now()) {
                Ok(report) => {
                    on_cycle(&report);
                    if report.target_reached {
                        info!(value = report.portfolio_value, "target balance reached");
                        break StopReason::TargetReached;
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!(cycle = attempted, error = %e, "trading cycle failed");
                }
            }

            if self.config.max_cycles == 0 || attempted < self.config.max_cycles {
                sleep(self.config.interval);
            }
        };

        SessionSummary {
            cycles_attempted: attempted,
            cycles_failed: failed,
            stop_reason,
            final_value: self.wallet.total_value(&self.last_prices),
            progress_to_target: self.wallet.progress_to_target(&self.last_prices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agents::AgentRole;
    use crate::domain::strategy::find_strategy;
    use crate::ports::llm_port::Prompt;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    struct Market {
        prices: RefCell<HashMap<String, f64>>,
    }

    impl Market {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Market {
                prices: RefCell::new(pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()),
            }
        }

        fn set(&self, symbol: &str, price: f64) {
            self.prices.borrow_mut().insert(symbol.to_string(), price);
        }
    }

    impl MarketPort for Market {
        fn current_price(&self, symbol: &str) -> Result<f64, TraderError> {
            self.prices
                .borrow()
                .get(symbol)
                .copied()
                .ok_or_else(|| TraderError::Market {
                    symbol: symbol.to_string(),
                    reason: "Invalid symbol.".into(),
                })
        }

        fn stats_24h(&self, symbol: &str) -> Result<Ticker24h, TraderError> {
            Ok(Ticker24h {
                symbol: symbol.to_string(),
                price_change: 1.0,
                price_change_percent: 1.0,
                volume: 10.0,
                quote_volume: 100.0,
            })
        }
    }

    /// Replies "[]" to everyone except the executor, which gets `executor`.
    struct Llm {
        executor: RefCell<Vec<String>>,
        calls: Cell<usize>,
        fail: bool,
    }

    impl Llm {
        fn replying(executor: &[&str]) -> Self {
            Llm {
                executor: RefCell::new(executor.iter().rev().map(|s| s.to_string()).collect()),
                calls: Cell::new(0),
                fail: false,
            }
        }
    }

    impl LlmPort for Llm {
        fn complete(&self, prompt: &Prompt) -> Result<String, TraderError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(TraderError::Llm {
                    reason: "down".into(),
                });
            }
            if prompt.role == AgentRole::Executor {
                Ok(self.executor.borrow_mut().pop().unwrap_or_else(|| "[]".into()))
            } else {
                Ok("analysis".into())
            }
        }
    }

    #[derive(Default)]
    struct Memory {
        saved: RefCell<Vec<SessionState>>,
    }

    impl StatePort for Memory {
        fn save(&self, state: &SessionState) -> Result<(), TraderError> {
            self.saved.borrow_mut().push(state.clone());
            Ok(())
        }

        fn load(&self, strategy: &str) -> Result<Option<SessionState>, TraderError> {
            Ok(self
                .saved
                .borrow()
                .iter()
                .rev()
                .find(|s| s.strategy == strategy)
                .cloned())
        }

        fn load_all(&self) -> Result<BTreeMap<String, SessionState>, TraderError> {
            Ok(self
                .saved
                .borrow()
                .iter()
                .map(|s| (s.strategy.clone(), s.clone()))
                .collect())
        }

        fn clear(&self, _strategy: Option<&str>) -> Result<(), TraderError> {
            self.saved.borrow_mut().clear();
            Ok(())
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn config(max_cycles: u64) -> SessionConfig {
        SessionConfig {
            trading_pairs: vec!["BTCUSDT".into(), "ETHUSDT".into(), "GONEUSDT".into()],
            max_cycles,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn initialize_seeds_half_into_btc_once() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), config(1));

        let trade = session.initialize(at()).unwrap().unwrap();
        assert_relative_eq!(trade.total, 10.0);
        assert_relative_eq!(trade.amount, 0.0002);
        assert_relative_eq!(session.wallet().balance, 10.0);
        assert!(session.initialize(at()).unwrap().is_none());
    }

    #[test]
    fn initialize_skips_when_balance_too_small() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(3.0, 100.0), config(1));
        assert!(session.initialize(at()).unwrap().is_none());
        assert_relative_eq!(session.wallet().balance, 3.0);
    }

    #[test]
    fn initialize_propagates_price_failure() {
        let market = Market::new(&[]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100.0), config(1));
        assert!(matches!(session.initialize(at()), Err(TraderError::Market { .. })));
    }

    #[test]
    fn cycle_executes_valid_and_reports_rejected() {
        let market = Market::new(&[("BTCUSDT", 50_000.0), ("ETHUSDT", 2_500.0)]);
        let llm = Llm::replying(&[r#"[
            {"type": "BUY", "symbol": "ETHUSDT", "amount": 0.0024, "reason": "dip"},
            {"type": "BUY", "symbol": "ETHUSDT", "amount": 1, "reason": "all in"},
            {"type": "BUY", "symbol": "XYZUSDT", "amount": 1, "reason": "moon"}
        ]"#]);
        let state = Memory::default();
        let strategy = find_strategy("balanced").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), config(1))
            .with_state(&state);
        session.initialize(at()).unwrap();

        let report = session.run_cycle(at()).unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.skipped_pairs, vec!["GONEUSDT"]);
        assert_eq!(report.plan_source, PlanSource::ExecutorJson);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].reason.contains("insufficient balance"));
        assert_relative_eq!(session.wallet().balance, 4.0, epsilon = 1e-9);
        assert_relative_eq!(report.portfolio_value, 20.0, epsilon = 1e-9);
        assert!(!report.target_reached);
        assert_eq!(llm.calls.get(), AgentRole::ALL.len());

        let saved = state.saved.borrow();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].strategy, "balanced");
        assert_eq!(saved[0].cycles_completed, 1);
        assert_eq!(saved[0].wallet.trade_history.len(), 2);
        assert_eq!(saved[0].last_cycle.as_ref().unwrap().executed.len(), 1);
    }

    #[test]
    fn cycle_applies_exit_rules_before_agents() {
        let market = Market::new(&[("BTCUSDT", 50_000.0), ("ETHUSDT", 2_500.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let cfg = SessionConfig {
            exits: ExitRules {
                stop_loss_pct: 5.0,
                take_profit_pct: 15.0,
            },
            ..config(1)
        };
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), cfg);
        session.initialize(at()).unwrap();

        market.set("BTCUSDT", 60_000.0);
        let report = session.run_cycle(at()).unwrap();
        assert_eq!(report.exits.len(), 1);
        assert_relative_eq!(report.exits[0].profit_loss.unwrap(), 2.0, epsilon = 1e-9);
        assert!(!session.wallet().has_position("BTCUSDT"));
        assert_relative_eq!(session.wallet().balance, 22.0, epsilon = 1e-9);
    }

    #[test]
    fn exit_trades_are_saved_when_agents_fail() {
        let market = Market::new(&[("BTCUSDT", 50_000.0), ("ETHUSDT", 2_500.0)]);
        let mut llm = Llm::replying(&[]);
        llm.fail = true;
        let state = Memory::default();
        let strategy = find_strategy("conservative").unwrap();
        let cfg = SessionConfig {
            exits: ExitRules {
                stop_loss_pct: 5.0,
                take_profit_pct: 15.0,
            },
            ..config(1)
        };
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), cfg)
            .with_state(&state);
        session.initialize(at()).unwrap();
        assert!(session.wallet().has_position("BTCUSDT"));

        market.set("BTCUSDT", 47_000.0);
        assert!(session.run_cycle(at()).is_err());
        assert!(!session.wallet().has_position("BTCUSDT"));
        assert_eq!(session.cycles_completed(), 0);

        let saved = state.saved.borrow();
        let last = saved.last().expect("state saved after exit");
        assert!(!last.wallet.has_position("BTCUSDT"));
        assert_eq!(last.wallet.trade_history.len(), 2);
        assert_eq!(last.cycles_completed, 0);
        assert!(last.last_cycle.is_none());
    }

    #[test]
    fn failed_cycle_without_exits_saves_nothing() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let mut llm = Llm::replying(&[]);
        llm.fail = true;
        let state = Memory::default();
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), config(1))
            .with_state(&state);
        assert!(session.run_cycle(at()).is_err());
        assert!(state.saved.borrow().is_empty());
    }

    #[test]
    fn cycle_fails_without_any_prices() {
        let market = Market::new(&[]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100.0), config(1));
        assert!(matches!(session.run_cycle(at()), Err(TraderError::NoPrices)));
        assert_eq!(llm.calls.get(), 0);
        assert_eq!(session.cycles_completed(), 0);
    }

    #[test]
    fn run_stops_after_max_cycles_and_counts_failures() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let mut llm = Llm::replying(&[]);
        llm.fail = true;
        let strategy = find_strategy("conservative").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), config(3));

        let mut sleeps = Vec::new();
        let mut seen = 0;
        let summary = session.run(&mut |d| sleeps.push(d), &mut |_| seen += 1);

        assert_eq!(summary.stop_reason, StopReason::CycleLimit);
        assert_eq!(summary.cycles_attempted, 3);
        assert_eq!(summary.cycles_failed, 3);
        assert_eq!(seen, 0);
        assert_eq!(sleeps, vec![DEFAULT_INTERVAL, DEFAULT_INTERVAL]);
    }

    #[test]
    fn run_stops_when_target_reached() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("aggressive").unwrap();
        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 20.0), config(0));

        let mut cycles = 0;
        let summary = session.run(&mut |_| {}, &mut |_| cycles += 1);
        assert_eq!(summary.stop_reason, StopReason::TargetReached);
        assert_eq!(summary.cycles_attempted, 1);
        assert_eq!(cycles, 1);
        assert_relative_eq!(summary.final_value, 20.0);
        assert_relative_eq!(summary.progress_to_target, 100.0);
    }

    #[test]
    fn resume_replaces_wallet_and_cycle_count() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let mut saved_wallet = Wallet::new(20.0, 100_000.0);
        saved_wallet.seed_position("BTCUSDT", 40_000.0, 0.5, at()).unwrap();
        let saved = SessionState {
            strategy: "conservative".into(),
            wallet: saved_wallet,
            cycles_completed: 7,
            last_cycle: None,
            last_updated: at(),
        };

        let mut session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100_000.0), config(1))
            .resume_from(saved);
        assert!(session.initialize(at()).unwrap().is_none());
        assert_eq!(session.cycles_completed(), 7);
        let report = session.run_cycle(at()).unwrap();
        assert_eq!(report.cycle, 8);
        assert_relative_eq!(report.portfolio_value, 22.5, epsilon = 1e-9);
    }

    #[test]
    fn stats_are_fetched_when_enabled() {
        let market = Market::new(&[("BTCUSDT", 50_000.0)]);
        let llm = Llm::replying(&[]);
        let strategy = find_strategy("conservative").unwrap();
        let cfg = SessionConfig {
            include_stats: true,
            ..config(1)
        };
        let session = TradingSession::new(&market, &llm, strategy, Wallet::new(20.0, 100.0), cfg);
        let mut prices = PriceMap::new();
        prices.insert("BTCUSDT".into(), 50_000.0);
        assert_eq!(session.fetch_stats(&prices).len(), 1);
    }

    #[test]
    fn session_state_round_trips_through_json() {
        let state = SessionState {
            strategy: "balanced".into(),
            wallet: Wallet::new(20.0, 100.0),
            cycles_completed: 2,
            last_cycle: None,
            last_updated: at(),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
