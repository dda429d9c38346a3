//! Trade history export to CSV.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::domain::error::TraderError;
use crate::domain::position::{Side, Trade};

#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    timestamp: String,
    symbol: &'a str,
    side: Side,
    amount: f64,
    price: f64,
    total: f64,
    profit_loss: Option<f64>,
}

fn csv_error(e: csv::Error) -> TraderError {
    TraderError::State {
        reason: format!("CSV write error: {e}"),
    }
}

/// Write one row per trade, with a header. `profit_loss` is blank on buys.
pub fn write_trades<W: Write>(writer: W, trades: &[Trade]) -> Result<(), TraderError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for trade in trades {
        wtr.serialize(TradeRow {
            timestamp: trade.timestamp.to_rfc3339(),
            symbol: &trade.symbol,
            side: trade.side,
            amount: trade.amount,
            price: trade.price,
            total: trade.total,
            profit_loss: trade.profit_loss,
        })
        .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_trades(path: &Path, trades: &[Trade]) -> Result<(), TraderError> {
    let file = std::fs::File::create(path)?;
    write_trades(file, trades)
}
