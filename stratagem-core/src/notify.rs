//! Notification and streaming sink.
//!
//! The trader pushes one [`OrderNotification`] per trade transition worth
//! reporting (entry, exit, take-profit, stop-loss) and one [`StreamUpdate`]
//! per processing pass. Sinks are injected at construction.

use crate::analysis::TimeframeState;
use crate::domain::{Direction, Timeframe, TradeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationLabel {
    Entry,
    Exit,
    TakeProfit,
    StopLoss,
}

impl NotificationLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationLabel::Entry => "entry",
            NotificationLabel::Exit => "exit",
            NotificationLabel::TakeProfit => "take-profit",
            NotificationLabel::StopLoss => "stop-loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNotification {
    /// `None` for signal-only notifications (entry not admitted or trader inactive).
    pub trade_id: Option<TradeId>,
    pub direction: Direction,
    pub market_id: String,
    /// Price formatted at the instrument's precision.
    pub price: String,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub label: NotificationLabel,
    pub profit_loss_rate: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Per-pass snapshot for live displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamUpdate {
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub open_trades: usize,
    pub timeframes: Vec<TimeframeState>,
}

/// Trait for notification sinks.
pub trait Notifier: Send + Sync {
    fn notify_order(&self, notification: &OrderNotification);

    fn stream(&self, _update: &StreamUpdate) {}
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify_order(&self, _notification: &OrderNotification) {}
}

/// Keeps every order notification in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    orders: Mutex<Vec<OrderNotification>>,
    streams: Mutex<usize>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<OrderNotification> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stream_count(&self) -> usize {
        *self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for CollectingNotifier {
    fn notify_order(&self, notification: &OrderNotification) {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner).push(notification.clone());
    }

    fn stream(&self, _update: &StreamUpdate) {
        *self.streams.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Writes order notifications to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_order(&self, n: &OrderNotification) {
        info!(
            market_id = %n.market_id,
            trade_id = ?n.trade_id.map(|id| id.0),
            direction = %n.direction,
            timeframe = %n.timeframe,
            price = %n.price,
            rate = ?n.profit_loss_rate,
            "{}",
            n.label.as_str()
        );
    }
}
