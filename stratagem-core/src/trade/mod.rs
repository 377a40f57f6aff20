//! Trade state machine.
//!
//! A trade owns one entry order and, once filled, at most one resident stop
//! order, one resident take-profit limit order and one market close order.
//! States move forward only:
//!
//! ```text
//! Created -> EntryPending -> Active -> Closing -> Closed
//!    |             |
//!    +-> Rejected  +-> Canceled
//! ```
//!
//! Every fill is clamped so that `0 <= exec_entry_qty <= order_quantity` and
//! `0 <= exec_exit_qty <= exec_entry_qty` always hold.

pub mod operation;
pub mod orders;
pub mod reconcile;

pub use operation::TradeOperation;
pub use orders::{ModifyOutcome, TradeEntry};

use crate::domain::{Direction, Instrument, OrderId, PositionId, RefId, Timeframe, TradeId, TradeMode};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Quantities closer than this are treated as equal.
pub(crate) const QTY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Created,
    EntryPending,
    Active,
    Closing,
    Closed,
    Canceled,
    Rejected,
}

impl TradeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TradeState::Closed | TradeState::Canceled | TradeState::Rejected)
    }
}

/// How the position is carried, from the instrument's trade mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Spot,
    Margin,
}

impl From<TradeMode> for TradeKind {
    fn from(mode: TradeMode) -> Self {
        match mode {
            TradeMode::Spot => TradeKind::Spot,
            TradeMode::Margin | TradeMode::IndividualMargin => TradeKind::Margin,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrderType {
    Market,
    #[default]
    Limit,
}

/// One order of the trade as known locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    /// Exchange id, known once acknowledged.
    pub order_id: Option<OrderId>,
    pub ref_id: RefId,
    pub price: Option<f64>,
    pub quantity: f64,
    pub filled: f64,
    /// Still working on the exchange.
    pub resident: bool,
}

impl OrderLeg {
    fn new(ref_id: RefId, order_id: OrderId, price: Option<f64>, quantity: f64) -> Self {
        Self { order_id: Some(order_id), ref_id, price, quantity, filled: 0.0, resident: true }
    }

    /// Whether an event with these identifiers belongs to this leg.
    pub fn matches(&self, order_id: &OrderId, ref_id: Option<&RefId>) -> bool {
        self.order_id.as_ref() == Some(order_id) || ref_id == Some(&self.ref_id)
    }
}

/// Last exchange-side modification of a stop or target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifyMark {
    pub at: Option<DateTime<Utc>>,
    pub count: u32,
}

impl ModifyMark {
    pub fn within(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        self.at.is_some_and(|at| now - at < interval)
    }

    fn record(&mut self, now: DateTime<Utc>, interval: Duration) {
        self.count = if self.within(now, interval) { self.count + 1 } else { 1 };
        self.at = Some(now);
    }
}

/// Price excursion and fee side of a trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub best_price: f64,
    pub best_timestamp: Option<DateTime<Utc>>,
    pub worst_price: f64,
    pub worst_timestamp: Option<DateTime<Utc>>,
    pub entry_maker: bool,
    pub exit_maker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub kind: TradeKind,
    pub market_id: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub state: TradeState,

    pub order_type: EntryOrderType,
    pub order_price: f64,
    pub order_quantity: f64,

    pub entry: Option<OrderLeg>,
    pub stop_order: Option<OrderLeg>,
    pub limit_order: Option<OrderLeg>,
    pub exit_order: Option<OrderLeg>,
    pub position_id: Option<PositionId>,

    pub exec_entry_qty: f64,
    pub exec_exit_qty: f64,
    /// Average entry price.
    pub entry_price: f64,
    /// Average exit price.
    pub exit_price: f64,

    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub partial_tp: f64,

    pub entry_open_time: Option<DateTime<Utc>>,
    pub last_stop_loss: ModifyMark,
    pub last_take_profit: ModifyMark,

    #[serde(default)]
    pub operations: Vec<TradeOperation>,
    pub stats: TradeStats,
    /// Realized profit/loss rate, weighted by the exited share.
    pub profit_loss: f64,
    pub user_managed: bool,

    ref_seq: u32,
}

impl Trade {
    pub fn new(id: TradeId, instrument: &Instrument, direction: Direction, timeframe: Timeframe) -> Self {
        Self {
            id,
            kind: instrument.trade_mode.into(),
            market_id: instrument.market_id.clone(),
            direction,
            timeframe,
            state: TradeState::Created,
            order_type: EntryOrderType::default(),
            order_price: 0.0,
            order_quantity: 0.0,
            entry: None,
            stop_order: None,
            limit_order: None,
            exit_order: None,
            position_id: None,
            exec_entry_qty: 0.0,
            exec_exit_qty: 0.0,
            entry_price: 0.0,
            exit_price: 0.0,
            stop_loss: None,
            take_profit: None,
            partial_tp: 1.0,
            entry_open_time: None,
            last_stop_loss: ModifyMark::default(),
            last_take_profit: ModifyMark::default(),
            operations: Vec::new(),
            stats: TradeStats::default(),
            profit_loss: 0.0,
            user_managed: false,
            ref_seq: 0,
        }
    }

    // ─── State queries ───

    /// Entry at least partially filled and no close in progress.
    pub fn is_active(&self) -> bool {
        self.state == TradeState::Active
    }

    pub fn is_closing(&self) -> bool {
        self.state == TradeState::Closing
    }

    pub fn is_closed(&self) -> bool {
        self.state == TradeState::Closed
    }

    pub fn is_canceled(&self) -> bool {
        self.state == TradeState::Canceled
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Terminal with nothing left to run: safe to drop from the trader.
    pub fn can_delete(&self) -> bool {
        self.is_terminal() && self.operations.is_empty()
    }

    pub fn has_stop_order(&self) -> bool {
        self.stop_order.as_ref().is_some_and(|leg| leg.resident)
    }

    pub fn has_limit_order(&self) -> bool {
        self.limit_order.as_ref().is_some_and(|leg| leg.resident)
    }

    pub fn is_entry_timeout(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.state == TradeState::EntryPending && self.entry_open_time.is_some_and(|t| now - t >= timeout)
    }

    pub fn open_quantity(&self) -> f64 {
        (self.exec_entry_qty - self.exec_exit_qty).max(0.0)
    }

    /// Pivot ladder tier the take-profit aims at, 1..=3.
    pub fn target_tier(&self) -> usize {
        ((2.0 * self.partial_tp).floor().max(0.0) as usize + 1).min(3)
    }

    // ─── Performance ───

    /// Unrealized rate if the position were closed at `price`.
    pub fn profit_rate_at(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.direction.sign() * (price - self.entry_price) / self.entry_price
    }

    /// `rate` less the entry and exit fees of the sides actually used.
    pub fn fee_adjusted_rate(&self, rate: f64, instrument: &Instrument) -> f64 {
        rate - instrument.fee_rate(self.stats.entry_maker) - instrument.fee_rate(self.stats.exit_maker)
    }

    /// Track best and worst prices seen while the position is open.
    pub fn update_stats(&mut self, price: f64, now: DateTime<Utc>) {
        if self.exec_entry_qty <= 0.0 || !(price > 0.0) {
            return;
        }
        let stats = &mut self.stats;
        if stats.best_price <= 0.0 || self.direction.better(price, stats.best_price) {
            stats.best_price = price;
            stats.best_timestamp = Some(now);
        }
        if stats.worst_price <= 0.0 || self.direction.better(stats.worst_price, price) {
            stats.worst_price = price;
            stats.worst_timestamp = Some(now);
        }
    }

    // ─── Internals ───

    pub(crate) fn set_state(&mut self, state: TradeState) {
        if self.state != state {
            tracing::debug!(trade_id = %self.id, from = ?self.state, to = ?state, "trade state");
        }
        self.state = state;
        if state.is_terminal() {
            self.operations.clear();
        }
    }

    pub(crate) fn next_ref(&mut self, leg: &str) -> RefId {
        self.ref_seq += 1;
        RefId::for_leg(self.id, leg, self.ref_seq)
    }

    /// Fold an entry fill. `cumulative` is the order's total filled so far when known.
    pub(crate) fn apply_entry_fill(&mut self, quantity: f64, price: f64, cumulative: Option<f64>, avg_price: Option<f64>, maker: bool) {
        let prev = self.exec_entry_qty;
        let total = cumulative.unwrap_or(prev + quantity).min(self.order_quantity);
        if total <= prev + QTY_EPSILON || !(price > 0.0) {
            return;
        }
        let added = total - prev;
        self.entry_price = avg_price.filter(|p| *p > 0.0).unwrap_or((self.entry_price * prev + price * added) / total);
        self.exec_entry_qty = total;
        self.stats.entry_maker = maker;
        if let Some(leg) = self.entry.as_mut() {
            leg.filled = total;
            if total >= self.order_quantity - QTY_EPSILON {
                leg.resident = false;
            }
        }
        match self.state {
            TradeState::Created | TradeState::EntryPending => self.set_state(TradeState::Active),
            // Exits had flattened the part filled so far; the new fill is a live position again.
            TradeState::Closed if self.open_quantity() > QTY_EPSILON => self.set_state(TradeState::Active),
            _ => {}
        }
    }

    /// Fold an exit fill from the stop, limit or close order.
    pub(crate) fn apply_exit_fill(&mut self, quantity: f64, price: f64, maker: bool) {
        let added = quantity.min(self.open_quantity());
        if added <= QTY_EPSILON || !(price > 0.0) {
            return;
        }
        let prev = self.exec_exit_qty;
        self.exit_price = (self.exit_price * prev + price * added) / (prev + added);
        self.exec_exit_qty = prev + added;
        self.stats.exit_maker = maker;
        if self.entry_price > 0.0 && self.exec_entry_qty > 0.0 {
            self.profit_loss = self.profit_rate_at(self.exit_price) * (self.exec_exit_qty / self.exec_entry_qty);
        }
        if self.exec_exit_qty >= self.exec_entry_qty - QTY_EPSILON {
            self.exec_exit_qty = self.exec_entry_qty;
            self.set_state(TradeState::Closed);
        }
    }
}
