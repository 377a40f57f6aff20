//! Running performance of one strategy trader.

use crate::domain::{Direction, Instrument, Timeframe, TradeId};
use crate::trade::{Trade, TradeState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a trade taken when it leaves the trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTradeRecord {
    pub id: TradeId,
    pub entry_open_time: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub state: TradeState,
    pub order_price: f64,
    pub order_quantity: f64,
    pub exec_entry_qty: f64,
    pub exec_exit_qty: f64,
    pub avg_entry_price: f64,
    pub avg_exit_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub best_price: f64,
    pub best_timestamp: Option<DateTime<Utc>>,
    pub worst_price: f64,
    pub worst_timestamp: Option<DateTime<Utc>>,
    /// Realized rate after entry and exit fees.
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraderStats {
    /// Sum of fee-adjusted trade rates.
    pub perf: f64,
    pub best: f64,
    pub worst: f64,
    pub cont_win: u32,
    pub cont_loss: u32,
    pub failed: Vec<ClosedTradeRecord>,
    pub success: Vec<ClosedTradeRecord>,
    /// Break-even trades.
    pub roe: Vec<ClosedTradeRecord>,
}

impl TraderStats {
    pub fn trade_count(&self) -> usize {
        self.failed.len() + self.success.len() + self.roe.len()
    }

    /// Fold a terminated trade. Trades that never filled are not recorded.
    pub fn record(&mut self, trade: &Trade, instrument: &Instrument) -> Option<f64> {
        if trade.exec_entry_qty <= 0.0 {
            return None;
        }
        let rate = trade.fee_adjusted_rate(trade.profit_loss, instrument);

        self.perf += rate;
        self.best = self.best.max(rate);
        self.worst = self.worst.min(rate);
        if rate <= 0.0 {
            self.cont_loss += 1;
            self.cont_win = 0;
        } else {
            self.cont_win += 1;
            self.cont_loss = 0;
        }

        let record = ClosedTradeRecord {
            id: trade.id,
            entry_open_time: trade.entry_open_time,
            direction: trade.direction,
            timeframe: trade.timeframe,
            state: trade.state,
            order_price: trade.order_price,
            order_quantity: trade.order_quantity,
            exec_entry_qty: trade.exec_entry_qty,
            exec_exit_qty: trade.exec_exit_qty,
            avg_entry_price: trade.entry_price,
            avg_exit_price: trade.exit_price,
            stop_loss: trade.stop_loss,
            take_profit: trade.take_profit,
            best_price: trade.stats.best_price,
            best_timestamp: trade.stats.best_timestamp,
            worst_price: trade.stats.worst_price,
            worst_timestamp: trade.stats.worst_timestamp,
            rate,
        };
        if rate < 0.0 {
            self.failed.push(record);
        } else if rate > 0.0 {
            self.success.push(record);
        } else {
            self.roe.push(record);
        }
        Some(rate)
    }
}
