//! Configuration validation.
//!
//! Every section is checked before a session starts. Keys that are absent fall
//! back to defaults later; keys that are present must parse and be in range.

use crate::domain::error::TraderError;
use crate::domain::symbols::{parse_groups, parse_symbols};
use crate::domain::wallet::{DEFAULT_INITIAL_BALANCE, DEFAULT_TARGET_BALANCE};
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_wallet_config(config)?;
    validate_trading_config(config)?;
    validate_llm_config(config)?;
    validate_market_config(config)?;
    validate_state_config(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// The value of `key` as a float, `None` when unset.
fn read_double(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, TraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

fn read_int(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, TraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{raw}' is not an integer"))),
    }
}

fn require_non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), TraderError> {
    match config.get_string(section, key) {
        Some(s) if s.trim().is_empty() => Err(invalid(section, key, format!("{key} must not be empty"))),
        _ => Ok(()),
    }
}

fn require_min_int(config: &dyn ConfigPort, section: &str, key: &str, min: i64) -> Result<(), TraderError> {
    match read_int(config, section, key)? {
        Some(v) if v < min => Err(invalid(section, key, format!("{key} must be at least {min}"))),
        _ => Ok(()),
    }
}

fn require_url(config: &dyn ConfigPort, section: &str) -> Result<(), TraderError> {
    match config.get_string(section, "base_url") {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => Err(invalid(
            section,
            "base_url",
            "base_url must start with http:// or https://",
        )),
        _ => Ok(()),
    }
}

pub fn validate_wallet_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let initial = read_double(config, "wallet", "initial_balance")?.unwrap_or(DEFAULT_INITIAL_BALANCE);
    if initial <= 0.0 {
        return Err(invalid("wallet", "initial_balance", "initial_balance must be positive"));
    }

    let target = read_double(config, "wallet", "target_balance")?.unwrap_or(DEFAULT_TARGET_BALANCE);
    if target <= initial {
        return Err(invalid(
            "wallet",
            "target_balance",
            "target_balance must be greater than initial_balance",
        ));
    }

    if let Some(min) = read_double(config, "wallet", "min_purchase_amount")? {
        if min < 0.0 {
            return Err(invalid(
                "wallet",
                "min_purchase_amount",
                "min_purchase_amount must be non-negative",
            ));
        }
    }

    if let Some(fraction) = read_double(config, "wallet", "seed_fraction")? {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid("wallet", "seed_fraction", "seed_fraction must be between 0 and 1"));
        }
    }

    require_non_empty(config, "wallet", "seed_symbol")
}

pub fn validate_trading_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(pairs) = config.get_string("trading", "pairs") {
        parse_symbols(&pairs).map_err(|e| invalid("trading", "pairs", e.to_string()))?;
    }
    if let Some(groups) = config.get_string("trading", "groups") {
        parse_groups(&groups).map_err(|e| invalid("trading", "groups", e.to_string()))?;
    }
    require_non_empty(config, "trading", "strategy")?;

    require_min_int(config, "trading", "interval_secs", 0)?;
    require_min_int(config, "trading", "max_cycles", 0)?;
    require_min_int(config, "trading", "max_trades_per_day", 1)?;

    if let Some(risk) = read_double(config, "trading", "max_risk_per_trade")? {
        if !(0.0..=1.0).contains(&risk) {
            return Err(invalid(
                "trading",
                "max_risk_per_trade",
                "max_risk_per_trade must be between 0 and 1",
            ));
        }
    }

    if let Some(stop) = read_double(config, "trading", "stop_loss_pct")? {
        if !(0.0..100.0).contains(&stop) {
            return Err(invalid(
                "trading",
                "stop_loss_pct",
                "stop_loss_pct must be at least 0 and below 100",
            ));
        }
    }

    if let Some(take) = read_double(config, "trading", "take_profit_pct")? {
        if take < 0.0 {
            return Err(invalid("trading", "take_profit_pct", "take_profit_pct must be non-negative"));
        }
    }

    Ok(())
}

pub fn validate_llm_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    require_url(config, "llm")?;
    require_non_empty(config, "llm", "model")?;

    if let Some(t) = read_double(config, "llm", "temperature")? {
        if !(0.0..=2.0).contains(&t) {
            return Err(invalid("llm", "temperature", "temperature must be between 0 and 2"));
        }
    }

    require_min_int(config, "llm", "max_tokens", 1)?;
    require_min_int(config, "llm", "timeout_secs", 1)?;
    require_min_int(config, "llm", "max_retries", 0)?;
    require_min_int(config, "llm", "min_interval_ms", 0)?;
    require_min_int(config, "llm", "initial_backoff_ms", 0)?;
    require_min_int(config, "llm", "max_backoff_ms", 0)?;

    let initial = read_int(config, "llm", "initial_backoff_ms")?;
    let max = read_int(config, "llm", "max_backoff_ms")?;
    if let (Some(initial), Some(max)) = (initial, max) {
        if max < initial {
            return Err(invalid(
                "llm",
                "max_backoff_ms",
                "max_backoff_ms must not be below initial_backoff_ms",
            ));
        }
    }
    Ok(())
}

pub fn validate_market_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    require_url(config, "market")?;
    require_min_int(config, "market", "min_interval_ms", 0)?;
    require_min_int(config, "market", "timeout_secs", 1)
}

pub fn validate_state_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    require_non_empty(config, "state", "path")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn invalid_key(err: TraderError) -> String {
        match err {
            TraderError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn full_config_passes() {
        let config = make_config(
            r#"
[wallet]
initial_balance = 20
target_balance = 100000
min_purchase_amount = 5
seed_symbol = BTCUSDT
seed_fraction = 0.5

[trading]
strategy = balanced
pairs = BTCUSDT,ETHUSDT,DOGEUSDT
interval_secs = 10
max_cycles = 0
max_trades_per_day = 5000
max_risk_per_trade = 0.1
stop_loss_pct = 5
take_profit_pct = 15

[llm]
base_url = https://api.together.xyz/v1
model = mistralai/Mixtral-8x7B-Instruct-v0.1
temperature = 0.7
max_tokens = 1000
timeout_secs = 60
max_retries = 3
initial_backoff_ms = 1000
max_backoff_ms = 30000
min_interval_ms = 100

[market]
base_url = https://api.binance.com
min_interval_ms = 100
timeout_secs = 10

[state]
path = trading_state.json
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_config_uses_defaults() {
        assert!(validate_config(&make_config("")).is_ok());
    }

    #[test]
    fn initial_balance_must_be_positive() {
        let err = validate_wallet_config(&make_config("[wallet]\ninitial_balance = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "initial_balance");
    }

    #[test]
    fn unparsable_number_is_reported() {
        let err = validate_wallet_config(&make_config("[wallet]\ninitial_balance = twenty\n")).unwrap_err();
        assert!(err.to_string().contains("'twenty' is not a number"));
    }

    #[test]
    fn target_must_exceed_initial() {
        let err = validate_wallet_config(&make_config(
            "[wallet]\ninitial_balance = 500\ntarget_balance = 100\n",
        ))
        .unwrap_err();
        assert_eq!(invalid_key(err), "target_balance");
    }

    #[test]
    fn default_target_checked_against_large_initial() {
        let err = validate_wallet_config(&make_config("[wallet]\ninitial_balance = 200000\n")).unwrap_err();
        assert_eq!(invalid_key(err), "target_balance");
    }

    #[test]
    fn seed_fraction_out_of_range() {
        let err = validate_wallet_config(&make_config("[wallet]\nseed_fraction = 1.5\n")).unwrap_err();
        assert_eq!(invalid_key(err), "seed_fraction");
    }

    #[test]
    fn negative_min_purchase_fails() {
        let err = validate_wallet_config(&make_config("[wallet]\nmin_purchase_amount = -1\n")).unwrap_err();
        assert_eq!(invalid_key(err), "min_purchase_amount");
    }

    #[test]
    fn duplicate_pair_fails() {
        let err = validate_trading_config(&make_config("[trading]\npairs = BTCUSDT,btcusdt\n")).unwrap_err();
        assert!(err.to_string().contains("duplicate symbol: BTCUSDT"));
    }

    #[test]
    fn unknown_group_fails() {
        let err = validate_trading_config(&make_config("[trading]\ngroups = major,nft\n")).unwrap_err();
        assert_eq!(invalid_key(err), "groups");
    }

    #[test]
    fn zero_daily_trades_fails() {
        let err = validate_trading_config(&make_config("[trading]\nmax_trades_per_day = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_trades_per_day");
    }

    #[test]
    fn risk_above_one_fails() {
        let err = validate_trading_config(&make_config("[trading]\nmax_risk_per_trade = 1.5\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_risk_per_trade");
    }

    #[test]
    fn stop_loss_of_hundred_percent_fails() {
        let err = validate_trading_config(&make_config("[trading]\nstop_loss_pct = 100\n")).unwrap_err();
        assert_eq!(invalid_key(err), "stop_loss_pct");
    }

    #[test]
    fn negative_take_profit_fails() {
        let err = validate_trading_config(&make_config("[trading]\ntake_profit_pct = -1\n")).unwrap_err();
        assert_eq!(invalid_key(err), "take_profit_pct");
    }

    #[test]
    fn temperature_out_of_range() {
        let err = validate_llm_config(&make_config("[llm]\ntemperature = 3\n")).unwrap_err();
        assert_eq!(invalid_key(err), "temperature");
    }

    #[test]
    fn backoff_order_checked() {
        let err = validate_llm_config(&make_config(
            "[llm]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 100\n",
        ))
        .unwrap_err();
        assert_eq!(invalid_key(err), "max_backoff_ms");
    }

    #[test]
    fn non_integer_tokens_fail() {
        let err = validate_llm_config(&make_config("[llm]\nmax_tokens = lots\n")).unwrap_err();
        assert_eq!(invalid_key(err), "max_tokens");
    }

    #[test]
    fn bad_base_url_fails() {
        let err = validate_market_config(&make_config("[market]\nbase_url = api.binance.com\n")).unwrap_err();
        assert_eq!(invalid_key(err), "base_url");
    }

    #[test]
    fn zero_timeout_fails() {
        let err = validate_market_config(&make_config("[market]\ntimeout_secs = 0\n")).unwrap_err();
        assert_eq!(invalid_key(err), "timeout_secs");
    }
}
