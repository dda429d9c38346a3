//! Trading performance statistics over a wallet's history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::position::{Side, Trade};
use super::wallet::EquityPoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction of sells with positive realized P&L.
    pub win_rate: f64,
    pub total_profit_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}

impl PerformanceSummary {
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint]) -> Self {
        let mut buys = 0usize;
        let mut sells = 0usize;
        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in trades {
            match trade.side {
                Side::Buy => buys += 1,
                Side::Sell => sells += 1,
            }
            let Some(pnl) = trade.profit_loss else {
                continue;
            };
            if pnl > 0.0 {
                winning_trades += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losing_trades += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
        }

        let win_rate = if sells > 0 {
            winning_trades as f64 / sells as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        PerformanceSummary {
            total_trades: trades.len(),
            buys,
            sells,
            winning_trades,
            losing_trades,
            win_rate,
            total_profit_loss: total_wins - total_losses,
            largest_win,
            largest_loss,
            profit_factor,
            max_drawdown: compute_drawdown(equity_curve),
        }
    }
}

/// Running realized P&L after each trade, in history order.
pub fn cumulative_pnl(trades: &[Trade]) -> Vec<(DateTime<Utc>, f64)> {
    let mut running = 0.0;
    trades
        .iter()
        .map(|t| {
            running += t.profit_loss.unwrap_or(0.0);
            (t.timestamp, running)
        })
        .collect()
}

/// Largest peak-to-trough decline of the equity curve, as a fraction of the peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    max_dd
}
