//! Trading pairs: built-in coin groups, pair-list parsing and probing the
//! market for which pairs are actually quoted.

use crate::domain::error::TraderError;
use crate::domain::market::PriceMap;
use crate::ports::market_port::MarketPort;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

pub const QUOTE_ASSET: &str = "USDT";

const MAJOR_COINS: &[&str] = &["BTC", "ETH", "BNB", "SOL", "ADA", "XRP", "DOGE"];

const MEME_COINS: &[&str] = &["PEPE", "FLOKI", "BONK", "BOME", "WIF"];

const DEFI_COINS: &[&str] = &[
    "UNI", "CAKE", "SUSHI", "COMP", "AAVE", "MKR", "YFI", "CRV", "SNX", "PERP", "GMX", "BAL",
    "1INCH", "ZRX",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinGroup {
    Major,
    Meme,
    Defi,
}

impl CoinGroup {
    pub const ALL: [CoinGroup; 3] = [CoinGroup::Major, CoinGroup::Meme, CoinGroup::Defi];

    fn assets(self) -> &'static [&'static str] {
        match self {
            CoinGroup::Major => MAJOR_COINS,
            CoinGroup::Meme => MEME_COINS,
            CoinGroup::Defi => DEFI_COINS,
        }
    }

    pub fn pairs(self) -> Vec<String> {
        self.assets()
            .iter()
            .map(|asset| format!("{asset}{QUOTE_ASSET}"))
            .collect()
    }

    pub fn contains(self, symbol: &str) -> bool {
        symbol
            .strip_suffix(QUOTE_ASSET)
            .is_some_and(|base| self.assets().contains(&base))
    }
}

impl FromStr for CoinGroup {
    type Err = SymbolListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "major" => Ok(CoinGroup::Major),
            "meme" => Ok(CoinGroup::Meme),
            "defi" => Ok(CoinGroup::Defi),
            other => Err(SymbolListError::UnknownGroup(other.to_string())),
        }
    }
}

/// Every pair of every group, majors first.
pub fn default_trading_pairs() -> Vec<String> {
    pairs_for_groups(&CoinGroup::ALL)
}

pub fn pairs_for_groups(groups: &[CoinGroup]) -> Vec<String> {
    let mut seen = HashSet::new();
    groups
        .iter()
        .flat_map(|g| g.pairs())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SymbolListError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("unknown coin group: {0}")]
    UnknownGroup(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SymbolListError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(SymbolListError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

pub fn parse_groups(input: &str) -> Result<Vec<CoinGroup>, SymbolListError> {
    input
        .split(',')
        .map(|token| {
            if token.trim().is_empty() {
                Err(SymbolListError::EmptyToken)
            } else {
                token.parse()
            }
        })
        .collect()
}

/// Upper-case `raw` and make sure it carries the `quote` suffix exactly once.
pub fn normalize_symbol(raw: &str, quote: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.ends_with(quote) && upper.len() > quote.len() {
        upper
    } else {
        format!("{upper}{quote}")
    }
}

#[derive(Debug, Clone)]
pub struct SkippedPair {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PairProbe {
    pub prices: PriceMap,
    pub skipped: Vec<SkippedPair>,
}

/// Ask the market for the current price of every pair. Pairs that fail are
/// skipped with a warning; it is an error only when nothing is quoted.
pub fn probe_pairs(market: &dyn MarketPort, symbols: &[String]) -> Result<PairProbe, TraderError> {
    let mut probe = PairProbe::default();

    for symbol in symbols {
        match market.current_price(symbol) {
            Ok(price) if price.is_finite() && price > 0.0 => {
                debug!(%symbol, price, "price fetched");
                probe.prices.insert(symbol.clone(), price);
            }
            Ok(price) => {
                warn!(%symbol, price, "skipping pair with unusable price");
                probe.skipped.push(SkippedPair {
                    symbol: symbol.clone(),
                    reason: format!("unusable price {price}"),
                });
            }
            Err(e) => {
                warn!(%symbol, error = %e, "skipping pair");
                probe.skipped.push(SkippedPair {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if probe.prices.is_empty() {
        return Err(TraderError::NoPrices);
    }
    Ok(probe)
}
