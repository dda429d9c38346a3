//! Domain error types.

/// A parse error with position information, used when LLM output cannot be
/// read as a trade list.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    ///
    /// Multi-line input is narrowed to the line containing the position.
    pub fn display_with_context(&self, input: &str) -> String {
        let position = floor_char_boundary(input, self.position);
        let line_start = input[..position].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = input[position..]
            .find('\n')
            .map(|i| position + i)
            .unwrap_or(input.len());
        let line = &input[line_start..line_end];
        let column = input[line_start..position].chars().count();
        let caret = " ".repeat(column) + "^";
        format!("{line}\n{caret}\n{err}", line = line, caret = caret, err = self)
    }
}

/// Largest char boundary in `text` at or before `index`, clamped to its length.
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Why the wallet refused a trade. A rejected trade leaves the wallet untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeRejection {
    #[error("invalid amount {0}")]
    InvalidAmount(f64),

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("purchase total ${total:.2} is below the ${minimum:.2} minimum")]
    BelowMinimum { total: f64, minimum: f64 },

    #[error("insufficient balance: need ${required:.2}, have ${available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("no open position in {0}")]
    NoPosition(String),

    #[error("cannot sell {requested} {symbol}: only {held} held")]
    InsufficientPosition {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("wallet already seeded")]
    AlreadySeeded,

    #[error("daily trade limit of {0} reached")]
    DailyLimitReached(usize),

    #[error("purchase total ${total:.2} exceeds the per-trade risk limit of ${limit:.2}")]
    ExceedsRiskLimit { total: f64, limit: f64 },
}

/// Top-level error type for papertrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    PlanParse(#[from] ParseError),

    #[error("llm request failed: {reason}")]
    Llm { reason: String },

    #[error("llm request failed after {attempts} attempts: {reason}")]
    LlmExhausted { attempts: u32, reason: String },

    #[error("market data error for {symbol}: {reason}")]
    Market { symbol: String, reason: String },

    #[error("no prices available for any configured pair")]
    NoPrices,

    #[error("state error: {reason}")]
    State { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Market { .. } | TraderError::NoPrices => 3,
            TraderError::Llm { .. } | TraderError::LlmExhausted { .. } => 4,
            TraderError::PlanParse(_) => 5,
            TraderError::State { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
