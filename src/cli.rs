//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use crate::adapters::binance_adapter::{self, BinanceClient, MarketConfig};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_state_adapter::{DEFAULT_STATE_PATH, JsonStateFile};
use crate::adapters::together_adapter::{self, LlmConfig, TogetherClient};
use crate::adapters::trade_csv::export_trades;
use crate::domain::config_validation::validate_config;
use crate::domain::error::TraderError;
use crate::domain::execution::{DEFAULT_MAX_TRADES_PER_DAY, ExecutionLimits, ExitRules};
use crate::domain::market::PriceMap;
use crate::domain::metrics::{PerformanceSummary, cumulative_pnl};
use crate::domain::plan_parser::{parse_with_fallback, repair_json_array};
use crate::domain::retry::RetryPolicy;
use crate::domain::session::{
    CycleReport, DEFAULT_SEED_FRACTION, DEFAULT_SEED_SYMBOL, SessionConfig, SessionState, StopReason,
    TradingSession,
};
use crate::domain::strategy::{DEFAULT_STRATEGY, builtin_strategies, resolve_strategy};
use crate::domain::symbols::{default_trading_pairs, pairs_for_groups, parse_groups, parse_symbols, probe_pairs};
use crate::domain::wallet::{DEFAULT_INITIAL_BALANCE, DEFAULT_MIN_PURCHASE, DEFAULT_TARGET_BALANCE, Wallet};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_port::MarketPort;
use crate::ports::state_port::StatePort;

#[derive(Parser, Debug)]
#[command(name = "papertrader", about = "Multi-agent LLM paper trading simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the trading loop against live prices
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy key: aggressive, balanced or conservative
        #[arg(short, long)]
        strategy: Option<String>,
        /// Stop after this many cycles (0 runs until the target is reached)
        #[arg(long)]
        cycles: Option<u64>,
        /// Session state file
        #[arg(long)]
        state: Option<PathBuf>,
        /// Continue from the saved wallet for this strategy
        #[arg(long)]
        resume: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show current prices for the configured pairs
    Prices {
        #[arg(short, long)]
        config: PathBuf,
        /// Include 24h change and volume
        #[arg(long)]
        stats: bool,
    },
    /// Parse a saved executor reply offline
    ParsePlan {
        /// File holding the executor's reply
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Trader plan to fall back on when the reply has no usable trades
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Summarize saved sessions
    Summary {
        #[arg(long)]
        state: Option<PathBuf>,
        #[arg(short, long)]
        strategy: Option<String>,
        /// Also print running realized P&L after every trade
        #[arg(long)]
        history: bool,
    },
    /// Export a saved session's trade history as CSV
    ExportTrades {
        #[arg(long)]
        state: Option<PathBuf>,
        #[arg(short, long)]
        strategy: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List the built-in strategies
    Strategies,
    /// Delete saved session state
    ClearState {
        #[arg(long)]
        state: Option<PathBuf>,
        /// Only this strategy; everything when omitted
        #[arg(short, long)]
        strategy: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run {
            config,
            strategy,
            cycles,
            state,
            resume,
        } => run_session(&config, strategy.as_deref(), cycles, state.as_deref(), resume),
        Command::Validate { config } => run_validate(&config),
        Command::Prices { config, stats } => run_prices(&config, stats),
        Command::ParsePlan { input, config, plan } => {
            run_parse_plan(&input, config.as_deref(), plan.as_deref())
        }
        Command::Summary {
            state,
            strategy,
            history,
        } => run_summary(state.as_deref(), strategy.as_deref(), history),
        Command::ExportTrades {
            state,
            strategy,
            output,
        } => run_export_trades(state.as_deref(), &strategy, &output),
        Command::Strategies => {
            run_strategies();
            Ok(())
        }
        Command::ClearState { state, strategy } => run_clear_state(state.as_deref(), strategy.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    FileConfigAdapter::from_file(path)
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, TraderError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_config(&adapter)?;
    Ok(adapter)
}

fn millis(config: &dyn ConfigPort, section: &str, key: &str, default: Duration) -> Duration {
    let ms = config.get_int(section, key, default.as_millis() as i64);
    Duration::from_millis(ms.max(0) as u64)
}

fn secs(config: &dyn ConfigPort, section: &str, key: &str, default: Duration) -> Duration {
    let s = config.get_int(section, key, default.as_secs() as i64);
    Duration::from_secs(s.max(0) as u64)
}

fn config_invalid(section: &str, key: &str, reason: String) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason,
    }
}

pub fn build_wallet(config: &dyn ConfigPort) -> Wallet {
    Wallet::new(
        config.get_double("wallet", "initial_balance", DEFAULT_INITIAL_BALANCE),
        config.get_double("wallet", "target_balance", DEFAULT_TARGET_BALANCE),
    )
    .with_min_purchase(config.get_double("wallet", "min_purchase_amount", DEFAULT_MIN_PURCHASE))
}

/// Explicit `pairs` win over `groups`; with neither, every built-in group.
pub fn resolve_pairs(config: &dyn ConfigPort) -> Result<Vec<String>, TraderError> {
    if let Some(pairs) = config.get_string("trading", "pairs") {
        return parse_symbols(&pairs).map_err(|e| config_invalid("trading", "pairs", e.to_string()));
    }
    if let Some(groups) = config.get_string("trading", "groups") {
        let groups = parse_groups(&groups).map_err(|e| config_invalid("trading", "groups", e.to_string()))?;
        return Ok(pairs_for_groups(&groups));
    }
    Ok(default_trading_pairs())
}

pub fn build_session_config(config: &dyn ConfigPort) -> Result<SessionConfig, TraderError> {
    let defaults = SessionConfig::default();
    Ok(SessionConfig {
        trading_pairs: resolve_pairs(config)?,
        seed_symbol: config
            .get_string("wallet", "seed_symbol")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_SEED_SYMBOL.to_string()),
        seed_fraction: config.get_double("wallet", "seed_fraction", DEFAULT_SEED_FRACTION),
        interval: secs(config, "trading", "interval_secs", defaults.interval),
        max_cycles: config.get_int("trading", "max_cycles", 0).max(0) as u64,
        limits: ExecutionLimits {
            max_trades_per_day: config
                .get_int("trading", "max_trades_per_day", DEFAULT_MAX_TRADES_PER_DAY as i64)
                .max(1) as usize,
            max_risk_per_trade: config.get_double("trading", "max_risk_per_trade", 0.0),
        },
        exits: ExitRules {
            stop_loss_pct: config.get_double("trading", "stop_loss_pct", 0.0),
            take_profit_pct: config.get_double("trading", "take_profit_pct", 0.0),
        },
        include_stats: config.get_bool("trading", "include_stats", false),
    })
}

/// `[llm] api_key` wins over the `TOGETHER_API_KEY` value passed in.
pub fn build_llm_config(config: &dyn ConfigPort, env_key: Option<String>) -> Result<LlmConfig, TraderError> {
    let api_key = config
        .get_string("llm", "api_key")
        .or(env_key)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "llm".into(),
            key: format!("api_key (or {} in the environment)", together_adapter::API_KEY_ENV),
        })?;

    let defaults = LlmConfig::new(&api_key);
    let retry_defaults = RetryPolicy::default();
    let max_retries = config
        .get_int("llm", "max_retries", i64::from(retry_defaults.max_attempts) - 1)
        .max(0) as u32;
    Ok(LlmConfig {
        base_url: config.get_string("llm", "base_url").unwrap_or(defaults.base_url),
        model: config.get_string("llm", "model").unwrap_or(defaults.model),
        temperature: config.get_double("llm", "temperature", defaults.temperature),
        max_tokens: config.get_int("llm", "max_tokens", defaults.max_tokens as i64).max(1) as u32,
        timeout: secs(config, "llm", "timeout_secs", defaults.timeout),
        min_interval: millis(config, "llm", "min_interval_ms", defaults.min_interval),
        retry: RetryPolicy {
            max_attempts: max_retries + 1,
            initial_backoff: millis(config, "llm", "initial_backoff_ms", retry_defaults.initial_backoff),
            max_backoff: millis(config, "llm", "max_backoff_ms", retry_defaults.max_backoff),
            backoff_multiplier: retry_defaults.backoff_multiplier,
        },
        api_key,
    })
}

pub fn build_market_config(config: &dyn ConfigPort, env_key: Option<String>) -> MarketConfig {
    let defaults = MarketConfig::default();
    MarketConfig {
        base_url: config.get_string("market", "base_url").unwrap_or(defaults.base_url),
        timeout: secs(config, "market", "timeout_secs", defaults.timeout),
        min_interval: millis(config, "market", "min_interval_ms", defaults.min_interval),
        api_key: config
            .get_string("market", "api_key")
            .or(env_key)
            .filter(|k| !k.trim().is_empty()),
    }
}

pub fn state_path(config: Option<&dyn ConfigPort>, override_path: Option<&Path>) -> PathBuf {
    if let Some(p) = override_path {
        return p.to_path_buf();
    }
    config
        .and_then(|c| c.get_string("state", "path"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH))
}

fn build_market(config: &dyn ConfigPort) -> Result<BinanceClient, TraderError> {
    BinanceClient::new(build_market_config(
        config,
        std::env::var(binance_adapter::API_KEY_ENV).ok(),
    ))
}

fn run_session(
    config_path: &Path,
    strategy_override: Option<&str>,
    cycles: Option<u64>,
    state_override: Option<&Path>,
    resume: bool,
) -> Result<(), TraderError> {
    let adapter = load_validated(config_path)?;

    let strategy_key = strategy_override
        .map(str::to_string)
        .or_else(|| adapter.get_string("trading", "strategy"))
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string());
    let strategy = resolve_strategy(&strategy_key);

    let mut session_config = build_session_config(&adapter)?;
    if let Some(n) = cycles {
        session_config.max_cycles = n;
    }

    let llm = TogetherClient::new(build_llm_config(
        &adapter,
        std::env::var(together_adapter::API_KEY_ENV).ok(),
    )?)?;
    let market = build_market(&adapter)?;
    let store = JsonStateFile::new(state_path(Some(&adapter), state_override));

    let saved = if resume { store.load(&strategy.key)? } else { None };

    eprintln!("Strategy: {} ({})", strategy.name, strategy.key);
    eprintln!("Trading {} pairs, state in {}", session_config.trading_pairs.len(), store.path().display());

    let mut session = TradingSession::new(&market, &llm, strategy, build_wallet(&adapter), session_config)
        .with_state(&store);
    match saved {
        Some(state) => {
            eprintln!("Resuming after {} completed cycles", state.cycles_completed);
            session = session.resume_from(state);
        }
        None if resume => eprintln!("No saved state for this strategy, starting fresh"),
        None => {}
    }

    if let Some(seed) = session.initialize(Utc::now())? {
        eprintln!("Initial purchase: {:.8} {} for ${:.2}", seed.amount, seed.symbol, seed.total);
    }
    println!("Starting trading with balance: ${:.2}", session.wallet().balance);
    println!("Target balance: ${:.2}", session.wallet().target_balance);

    let summary = session.run(&mut thread::sleep, &mut print_cycle);

    println!("\n=== Session Summary ===");
    match summary.stop_reason {
        StopReason::TargetReached => println!("Target balance reached."),
        StopReason::CycleLimit => println!("Cycle limit reached."),
    }
    println!(
        "Cycles:            {} ({} failed)",
        summary.cycles_attempted, summary.cycles_failed
    );
    println!("Final value:       ${:.2}", summary.final_value);
    println!("Progress:          {:.1}%", summary.progress_to_target);
    print_performance(&session.wallet().performance_summary());
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    print!("{}", format_cycle(report));
}

/// Render one cycle: every agent's output followed by the trades it produced.
pub fn format_cycle(report: &CycleReport) -> String {
    let mut out = format!(
        "\n=== Cycle {} ({}) ===\nPortfolio Value: ${:.2}\nProgress to Target: {:.1}%\n",
        report.cycle,
        report.at.format("%Y-%m-%d %H:%M:%S"),
        report.portfolio_value,
        report.progress_to_target
    );
    if !report.skipped_pairs.is_empty() {
        out.push_str(&format!("Skipped pairs: {}\n", report.skipped_pairs.join(", ")));
    }
    for trade in &report.exits {
        out.push_str(&format!(
            "Exit rule: sold {} {} at ${:.4} (P&L ${:.2})\n",
            trade.amount,
            trade.symbol,
            trade.price,
            trade.profit_loss.unwrap_or(0.0)
        ));
    }
    let outputs = &report.outputs;
    for (title, text) in [
        ("Market Analysis", &outputs.market_analysis),
        ("Risk Assessment", &outputs.risk_assessment),
        ("Financial Advice", &outputs.financial_advice),
        ("Risk Analysis", &outputs.risk_analysis),
        ("Trading Plan", &outputs.trading_plan),
    ] {
        out.push_str(&format!("\n{title}:\n{text}\n"));
    }
    out.push_str(&format!("\nInstructions ({}):\n", report.plan_source));
    if report.instructions.is_empty() {
        out.push_str("  none\n");
    }
    for trade in &report.executed {
        out.push_str(&format!(
            "  executed {} {} {} at ${:.4}\n",
            trade.side, trade.amount, trade.symbol, trade.price
        ));
    }
    for rejected in &report.rejected {
        out.push_str(&format!("  rejected {}: {}\n", rejected.instruction, rejected.reason));
    }
    if report.discarded > 0 {
        out.push_str(&format!("  {} malformed entries discarded\n", report.discarded));
    }
    out
}

fn print_performance(summary: &PerformanceSummary) {
    println!("Total trades:      {} ({} buys, {} sells)", summary.total_trades, summary.buys, summary.sells);
    println!("Win rate:          {:.1}%", summary.win_rate * 100.0);
    println!("Realized P&L:      ${:.2}", summary.total_profit_loss);
    println!("Largest win:       ${:.2}", summary.largest_win);
    println!("Largest loss:      ${:.2}", summary.largest_loss);
    println!("Profit factor:     {:.2}", summary.profit_factor);
    println!("Max drawdown:      -{:.1}%", summary.max_drawdown * 100.0);
}

fn run_validate(config_path: &Path) -> Result<(), TraderError> {
    let adapter = load_validated(config_path)?;
    let session = build_session_config(&adapter)?;
    let strategy_key = adapter
        .get_string("trading", "strategy")
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string());
    let strategy = resolve_strategy(&strategy_key);
    eprintln!("Config validated successfully");
    eprintln!("  Strategy: {} ({})", strategy.name, strategy.key);
    eprintln!("  Pairs:    {}", session.trading_pairs.join(","));
    Ok(())
}

fn run_prices(config_path: &Path, with_stats: bool) -> Result<(), TraderError> {
    let adapter = load_validated(config_path)?;
    let pairs = resolve_pairs(&adapter)?;
    let market = build_market(&adapter)?;

    let probe = probe_pairs(&market, &pairs)?;
    for (symbol, price) in &probe.prices {
        if with_stats {
            match market.stats_24h(symbol) {
                Ok(t) => println!(
                    "{symbol:<12} {price:>16.8} {:>+8.2}% {:<4} vol ${:.0}",
                    t.price_change_percent,
                    t.trend(),
                    t.quote_volume
                ),
                Err(e) => println!("{symbol:<12} {price:>16.8} (24h stats unavailable: {e})"),
            }
        } else {
            println!("{symbol:<12} {price:>16.8}");
        }
    }
    for skipped in &probe.skipped {
        println!("{:<12} skipped: {}", skipped.symbol, skipped.reason);
    }
    eprintln!("{} of {} pairs quoted", probe.prices.len(), pairs.len());
    Ok(())
}

/// Configured pairs as a price map for symbol checks only; prices are unused.
fn offline_price_map(config: Option<&dyn ConfigPort>) -> Result<PriceMap, TraderError> {
    let pairs = match config {
        Some(c) => resolve_pairs(c)?,
        None => default_trading_pairs(),
    };
    Ok(pairs.into_iter().map(|p| (p, 0.0)).collect())
}

fn run_parse_plan(input: &Path, config_path: Option<&Path>, plan_path: Option<&Path>) -> Result<(), TraderError> {
    let adapter = config_path.map(load_config).transpose()?;
    let known = offline_price_map(adapter.as_ref().map(|a| a as &dyn ConfigPort))?;

    let reply = fs::read_to_string(input)?;
    let plan_text = match plan_path {
        Some(p) => fs::read_to_string(p)?,
        None => String::new(),
    };

    let plan = match parse_with_fallback(&reply, &plan_text, &known) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{}", e.display_with_context(&repair_json_array(&reply)));
            return Err(e.into());
        }
    };

    println!("Source: {}", plan.source);
    println!("Accepted {}:", plan.instructions.len());
    for instruction in &plan.instructions {
        println!("  {instruction}");
    }
    if !plan.rejected.is_empty() {
        println!("Discarded {}:", plan.rejected.len());
        for r in &plan.rejected {
            println!("  #{} {}: {}", r.index, r.reason, r.raw);
        }
    }
    Ok(())
}

/// Human-readable summary of one saved session. Values use the prices seen in
/// the last completed cycle.
pub fn format_summary(state: &SessionState) -> String {
    let prices = state
        .last_cycle
        .as_ref()
        .map(|c| c.prices.clone())
        .unwrap_or_default();
    let wallet = &state.wallet;
    let perf = wallet.performance_summary();

    let mut out = format!(
        "[{}] updated {}, {} cycles\n  Cash:        ${:.2}\n  Total value: ${:.2}\n  Progress:    {:.1}% of ${:.2}\n",
        state.strategy,
        state.last_updated.format("%Y-%m-%d %H:%M:%S"),
        state.cycles_completed,
        wallet.balance,
        wallet.total_value(&prices),
        wallet.progress_to_target(&prices),
        wallet.target_balance,
    );
    for position in wallet.positions.values() {
        out.push_str(&format!(
            "  {} {} @ ${:.6}",
            position.amount, position.symbol, position.entry_price
        ));
        if let Some(&price) = prices.get(&position.symbol) {
            out.push_str(&format!(" ({:+.2}%)", position.change_pct(price)));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "  Trades: {} ({} sells), win rate {:.1}%, realized P&L ${:.2}\n",
        perf.total_trades,
        perf.sells,
        perf.win_rate * 100.0,
        perf.total_profit_loss
    ));
    out
}

fn run_summary(state_override: Option<&Path>, strategy: Option<&str>, history: bool) -> Result<(), TraderError> {
    let store = JsonStateFile::new(state_path(None, state_override));
    let states: Vec<SessionState> = match strategy {
        Some(key) => store.load(key)?.into_iter().collect(),
        None => store.load_all()?.into_values().collect(),
    };
    if states.is_empty() {
        eprintln!("No saved sessions in {}", store.path().display());
        return Ok(());
    }
    for state in &states {
        print!("{}", format_summary(state));
        if history {
            for (at, pnl) in cumulative_pnl(&state.wallet.trade_history) {
                println!("    {}  {:>+12.4}", at.format("%Y-%m-%d %H:%M:%S"), pnl);
            }
        }
    }
    Ok(())
}

fn run_export_trades(state_override: Option<&Path>, strategy: &str, output: &Path) -> Result<(), TraderError> {
    let store = JsonStateFile::new(state_path(None, state_override));
    let state = store.load(strategy)?.ok_or_else(|| TraderError::State {
        reason: format!("no saved session for strategy '{strategy}'"),
    })?;
    export_trades(output, &state.wallet.trade_history)?;
    eprintln!(
        "Wrote {} trades to {}",
        state.wallet.trade_history.len(),
        output.display()
    );
    Ok(())
}

fn run_strategies() {
    for s in builtin_strategies() {
        println!("{} - {} (risk: {}, target return {}%)", s.key, s.name, s.risk_level, s.target_return);
        for line in s.description.lines() {
            println!("    {line}");
        }
    }
}

fn run_clear_state(state_override: Option<&Path>, strategy: Option<&str>) -> Result<(), TraderError> {
    let store = JsonStateFile::new(state_path(None, state_override));
    store.clear(strategy)?;
    match strategy {
        Some(key) => eprintln!("Cleared state for {key}"),
        None => eprintln!("Cleared all saved state"),
    }
    Ok(())
}
