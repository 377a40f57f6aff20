//! Candidate entry/exit signals produced by timeframe analyzers.

use crate::domain::{Direction, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Entry,
    Exit,
}

/// Immutable candidate signal. Screening returns adjusted copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Fraction of the position the target applies to, in (0, 1].
    pub partial_tp: f64,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn entry(direction: Direction, timeframe: Timeframe, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: SignalKind::Entry,
            direction,
            timeframe,
            price,
            stop_loss: None,
            take_profit: None,
            partial_tp: 1.0,
            timestamp,
        }
    }

    pub fn exit(direction: Direction, timeframe: Timeframe, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self { kind: SignalKind::Exit, ..Self::entry(direction, timeframe, price, timestamp) }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_partial_tp(mut self, partial_tp: f64) -> Self {
        self.partial_tp = partial_tp.clamp(f64::EPSILON, 1.0);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn is_entry(&self) -> bool {
        self.kind == SignalKind::Entry
    }

    /// Relative distance to the target, positive when the target is on the profit side.
    pub fn gain_rate(&self) -> Option<f64> {
        let tp = self.take_profit?;
        (self.price > 0.0).then(|| (tp - self.price) / self.price * self.direction.sign())
    }

    /// Relative distance to the stop, positive when the stop is on the protective side.
    pub fn loss_rate(&self) -> Option<f64> {
        let sl = self.stop_loss?;
        (self.price > 0.0).then(|| (self.price - sl) / self.price * self.direction.sign())
    }
}
