//! Turns free-form LLM replies into validated trade instructions.
//!
//! The executor agent is asked for a JSON array but models wrap it in prose,
//! code fences, trailing commas or drop the brackets entirely. The reply is
//! repaired into the most plausible JSON array, parsed, and each element is
//! validated on its own so one malformed entry never costs the others. When no
//! JSON can be recovered, a regex pass over plain "buy 0.5 ETH" phrases is the
//! fallback.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::domain::error::{ParseError, floor_char_boundary};
use crate::domain::instruction::{
    InstructionRejection, ParsedPlan, PlanSource, RejectedInstruction, TradeInstruction,
};
use crate::domain::market::PriceMap;
use crate::domain::position::Side;
use crate::domain::symbols::{QUOTE_ASSET, normalize_symbol};

const REQUIRED_FIELDS: [&str; 4] = ["type", "symbol", "amount", "reason"];

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[\]}])").expect("valid regex"));

static ADJACENT_OBJECTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}(\s*)\{").expect("valid regex"));

static FREE_TEXT_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(buy|sell)\s+(\d+(?:\.\d+)?)\s+([a-z0-9]+)\b").expect("valid regex")
});

/// Content of the first fenced code block, or the whole text when unfenced.
fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

fn tidy(text: &str) -> String {
    let without_commas = TRAILING_COMMA.replace_all(text, "$1");
    ADJACENT_OBJECTS
        .replace_all(&without_commas, "},$1{")
        .into_owned()
}

/// Span of the first complete JSON array in `text` holding at least one
/// object, else of the first empty array. Bracketed prose such as "[1]" or
/// "[analysis]" is skipped, and so is a quoted "[]" ahead of real trades.
fn first_trade_array(text: &str) -> Option<(usize, usize)> {
    let mut first_empty = None;
    for (start, _) in text.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Array(items))) = stream.next() {
            let span = (start, start + stream.byte_offset());
            if items.iter().any(Value::is_object) {
                return Some(span);
            }
            if items.is_empty() && first_empty.is_none() {
                first_empty = Some(span);
            }
        }
    }
    first_empty
}

/// Repair an executor reply into text that should parse as a JSON array.
pub fn repair_json_array(raw: &str) -> String {
    let text = tidy(strip_code_fence(raw.trim()));
    let text = text.trim();

    if let Some((start, end)) = first_trade_array(text) {
        return text[start..end].to_string();
    }

    let first_bracket = text.find('[');
    let first_brace = text.find('{');
    let sliced = match (first_bracket, first_brace) {
        (Some(b), Some(o)) if o < b => slice_objects(text, o),
        (Some(b), _) => match text.rfind(']') {
            Some(end) if end > b => &text[b..=end],
            _ => &text[b..],
        },
        (None, Some(o)) => slice_objects(text, o),
        (None, None) => text,
    };

    let mut repaired = String::with_capacity(sliced.len() + 2);
    if !sliced.starts_with('[') {
        repaired.push('[');
    }
    repaired.push_str(sliced);
    if !sliced.ends_with(']') {
        repaired.push(']');
    }
    repaired
}

fn slice_objects(text: &str, start: usize) -> &str {
    match text.rfind('}') {
        Some(end) if end > start => &text[start..=end],
        _ => &text[start..],
    }
}

/// Byte offset of a serde_json error inside `text`.
fn error_offset(text: &str, err: &serde_json::Error) -> usize {
    let line = err.line().max(1);
    let column = err.column();
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    floor_char_boundary(text, line_start + column.saturating_sub(1))
}

/// Resolve a model-supplied symbol against the priced pairs. Accepts the exact
/// pair in any case, or a bare base asset when its USDT pair is priced.
fn resolve_symbol(raw: &str, prices: &PriceMap) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    if prices.contains_key(&upper) {
        return Some(upper);
    }
    let normalized = normalize_symbol(&upper, QUOTE_ASSET);
    prices.contains_key(&normalized).then_some(normalized)
}

fn validate_entry(value: &Value, prices: &PriceMap) -> Result<TradeInstruction, InstructionRejection> {
    let obj = value.as_object().ok_or(InstructionRejection::NotAnObject)?;
    for field in REQUIRED_FIELDS {
        if !obj.contains_key(field) {
            return Err(InstructionRejection::MissingField(field));
        }
    }

    let side_value = &obj["type"];
    let side: Side = side_value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| InstructionRejection::InvalidSide(side_value.to_string()))?;

    let symbol_value = &obj["symbol"];
    let symbol = symbol_value
        .as_str()
        .and_then(|s| resolve_symbol(s, prices))
        .ok_or_else(|| InstructionRejection::UnknownSymbol(symbol_value.to_string()))?;

    let amount_value = &obj["amount"];
    let amount = amount_value
        .as_f64()
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| InstructionRejection::InvalidAmount(amount_value.to_string()))?;

    let reason = match &obj["reason"] {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        other => Some(other.to_string()),
    };

    Ok(TradeInstruction {
        side,
        symbol,
        amount,
        reason,
    })
}

/// Parse the executor agent's reply. Fails only when no JSON can be recovered;
/// individually invalid entries are reported in [`ParsedPlan::rejected`].
pub fn parse_executor_output(raw: &str, prices: &PriceMap) -> Result<ParsedPlan, ParseError> {
    let repaired = repair_json_array(raw);
    let document: Value = serde_json::from_str(&repaired).map_err(|e| ParseError {
        message: format!("invalid trade list: {e}"),
        position: error_offset(&repaired, &e),
    })?;

    let entries = match document {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut plan = ParsedPlan {
        source: PlanSource::ExecutorJson,
        instructions: Vec::new(),
        rejected: Vec::new(),
    };
    for (index, entry) in entries.iter().enumerate() {
        match validate_entry(entry, prices) {
            Ok(instruction) => plan.instructions.push(instruction),
            Err(reason) => plan.rejected.push(RejectedInstruction {
                index,
                raw: entry.to_string(),
                reason,
            }),
        }
    }
    Ok(plan)
}

/// Pick "buy 0.5 ETH" / "SELL 10 dogeusdt" phrases out of prose, in the order
/// they appear. Only priced pairs are kept.
pub fn parse_free_text_plan(plan: &str, prices: &PriceMap) -> Vec<TradeInstruction> {
    FREE_TEXT_ORDER
        .captures_iter(plan)
        .filter_map(|caps| {
            let side: Side = caps[1].parse().ok()?;
            let amount: f64 = caps[2].parse().ok()?;
            if !(amount.is_finite() && amount > 0.0) {
                return None;
            }
            let symbol = normalize_symbol(&caps[3], QUOTE_ASSET);
            prices
                .contains_key(&symbol)
                .then(|| TradeInstruction::new(side, &symbol, amount))
        })
        .collect()
}

/// Executor JSON first; if it cannot be parsed, free text in the executor
/// reply; if that finds nothing, free text in the trader's plan.
pub fn parse_with_fallback(
    executor_output: &str,
    trading_plan: &str,
    prices: &PriceMap,
) -> Result<ParsedPlan, ParseError> {
    let err = match parse_executor_output(executor_output, prices) {
        Ok(plan) => return Ok(plan),
        Err(e) => e,
    };

    let from_executor = parse_free_text_plan(executor_output, prices);
    if !from_executor.is_empty() {
        return Ok(ParsedPlan {
            source: PlanSource::ExecutorText,
            instructions: from_executor,
            rejected: Vec::new(),
        });
    }

    let from_plan = parse_free_text_plan(trading_plan, prices);
    if !from_plan.is_empty() {
        return Ok(ParsedPlan {
            source: PlanSource::TradingPlanText,
            instructions: from_plan,
            rejected: Vec::new(),
        });
    }

    Err(err)
}
