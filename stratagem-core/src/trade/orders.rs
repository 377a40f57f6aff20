//! Outgoing order operations of a trade: open, protective orders, close.

use super::{EntryOrderType, OrderLeg, Trade, TradeState};
use crate::domain::{Direction, Instrument, RefId};
use crate::execution::{ExecutionError, OrderAck, OrderKind, OrderRequest, TradingExecution};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// Parameters of the entry order.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub order_type: EntryOrderType,
    pub price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub partial_tp: f64,
    pub timestamp: DateTime<Utc>,
}

/// Where a stop-loss or take-profit change ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// Only the local price changed.
    Local,
    /// A replacement order was submitted.
    Submitted,
}

#[derive(Debug, Clone, Copy)]
enum Protective {
    Stop,
    Limit,
}

impl Trade {
    fn request(&self, instrument: &Instrument, direction: Direction, kind: OrderKind, quantity: f64, reduce_only: bool, ref_id: RefId) -> OrderRequest {
        let price_hint = if reduce_only {
            instrument.close_exec_price(self.direction)
        } else {
            instrument.open_exec_price(self.direction)
        };
        OrderRequest {
            market_id: self.market_id.clone(),
            ref_id,
            direction,
            kind,
            quantity,
            reduce_only,
            price_hint,
            leverage: instrument.leverage,
            hedging: false,
        }
    }

    /// Submit the entry order. Returns `false` and moves to `Rejected` when
    /// the venue refuses it; the caller then removes the trade.
    pub fn open(&mut self, exec: &dyn TradingExecution, instrument: &Instrument, entry: &TradeEntry) -> bool {
        if self.state != TradeState::Created {
            return false;
        }
        self.order_type = entry.order_type;
        self.order_price = entry.price;
        self.order_quantity = entry.quantity;
        self.stop_loss = entry.stop_loss;
        self.take_profit = entry.take_profit;
        self.partial_tp = entry.partial_tp;
        self.entry_open_time = Some(entry.timestamp);

        let kind = match entry.order_type {
            EntryOrderType::Market => OrderKind::Market,
            EntryOrderType::Limit => OrderKind::Limit { price: instrument.adjust_price(entry.price) },
        };
        let ref_id = self.next_ref("entry");
        let request = self.request(instrument, self.direction, kind, entry.quantity, false, ref_id.clone());

        match exec.submit_order(&request) {
            Ok(OrderAck { order_id, fill }) => {
                let price = match kind {
                    OrderKind::Limit { price } => Some(price),
                    _ => None,
                };
                self.entry = Some(OrderLeg::new(ref_id, order_id, price, entry.quantity));
                self.set_state(TradeState::EntryPending);
                if let Some(fill) = fill {
                    self.apply_entry_fill(fill.quantity, fill.price, None, None, fill.maker);
                }
                true
            }
            Err(err) => {
                warn!(trade_id = %self.id, market_id = %self.market_id, error = %err, "entry order rejected");
                self.set_state(TradeState::Rejected);
                false
            }
        }
    }

    /// Move the stop-loss, re-issuing the resident stop order unless it was
    /// modified less than `min_interval` ago.
    pub fn modify_stop_loss(
        &mut self,
        exec: &dyn TradingExecution,
        instrument: &Instrument,
        price: f64,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<ModifyOutcome, ExecutionError> {
        self.modify_protective(Protective::Stop, exec, instrument, price, now, min_interval)
    }

    /// Move the take-profit, re-issuing the resident limit order unless it
    /// was modified less than `min_interval` ago.
    pub fn modify_take_profit(
        &mut self,
        exec: &dyn TradingExecution,
        instrument: &Instrument,
        price: f64,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<ModifyOutcome, ExecutionError> {
        self.modify_protective(Protective::Limit, exec, instrument, price, now, min_interval)
    }

    fn modify_protective(
        &mut self,
        which: Protective,
        exec: &dyn TradingExecution,
        instrument: &Instrument,
        price: f64,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> Result<ModifyOutcome, ExecutionError> {
        let price = instrument.adjust_price(price);
        let (resident, mark) = match which {
            Protective::Stop => {
                self.stop_loss = Some(price);
                (self.has_stop_order(), self.last_stop_loss)
            }
            Protective::Limit => {
                self.take_profit = Some(price);
                (self.has_limit_order(), self.last_take_profit)
            }
        };

        let quantity = self.open_quantity();
        if quantity <= 0.0 || self.state != TradeState::Active {
            return Ok(ModifyOutcome::Local);
        }
        if resident && mark.within(now, min_interval) {
            return Ok(ModifyOutcome::Local);
        }

        let slot = match which {
            Protective::Stop => &mut self.stop_order,
            Protective::Limit => &mut self.limit_order,
        };
        if let Some(leg) = slot.take() {
            if let Err(err) = cancel_leg(exec, &self.market_id, &leg) {
                *slot = Some(leg);
                return Err(err);
            }
        }

        let (tag, kind) = match which {
            Protective::Stop => ("stop", OrderKind::Stop { trigger: price }),
            Protective::Limit => ("limit", OrderKind::Limit { price }),
        };
        let ref_id = self.next_ref(tag);
        let request = self.request(instrument, self.direction.opposite(), kind, quantity, true, ref_id.clone());
        let ack = exec.submit_order(&request)?;

        let leg = OrderLeg::new(ref_id, ack.order_id, Some(price), quantity);
        match which {
            Protective::Stop => {
                self.stop_order = Some(leg);
                self.last_stop_loss.record(now, min_interval);
            }
            Protective::Limit => {
                self.limit_order = Some(leg);
                self.last_take_profit.record(now, min_interval);
            }
        }
        if let Some(fill) = ack.fill {
            self.apply_exit_fill(fill.quantity, fill.price, fill.maker);
            self.settle_exit(exec);
        }
        Ok(ModifyOutcome::Submitted)
    }

    /// Close the trade at market. Idempotent: returns `false` when a close is
    /// already in progress or the trade is terminal.
    pub fn close(&mut self, exec: &dyn TradingExecution, instrument: &Instrument) -> bool {
        if self.is_closing() || self.is_terminal() {
            return false;
        }
        self.cancel_entry_remainder(exec);
        for leg in [self.stop_order.take(), self.limit_order.take()].into_iter().flatten() {
            if let Err(err) = cancel_leg(exec, &self.market_id, &leg) {
                warn!(trade_id = %self.id, error = %err, "cancel of protective order failed");
            }
        }

        let quantity = self.open_quantity();
        if quantity <= 0.0 {
            self.set_state(TradeState::Canceled);
            return true;
        }

        let ref_id = self.next_ref("exit");
        let request = self.request(instrument, self.direction.opposite(), OrderKind::Market, quantity, true, ref_id.clone());
        match exec.submit_order(&request) {
            Ok(ack) => {
                self.exit_order = Some(OrderLeg::new(ref_id, ack.order_id, None, quantity));
                self.set_state(TradeState::Closing);
                if let Some(fill) = ack.fill {
                    self.apply_exit_fill(fill.quantity, fill.price, fill.maker);
                }
                true
            }
            Err(err) => {
                warn!(trade_id = %self.id, market_id = %self.market_id, error = %err, "close order rejected");
                false
            }
        }
    }

    /// Cancel the unfilled part of the entry. A trade with nothing filled
    /// becomes `Canceled`.
    pub fn cancel_open(&mut self, exec: &dyn TradingExecution) -> bool {
        if !matches!(self.state, TradeState::EntryPending | TradeState::Active) {
            return false;
        }
        let canceled = self.cancel_entry_remainder(exec);
        if self.exec_entry_qty <= 0.0 {
            self.set_state(TradeState::Canceled);
        }
        canceled
    }

    /// Cancel every order still resident, before the trade is dropped.
    pub fn remove(&mut self, exec: &dyn TradingExecution) {
        self.cancel_entry_remainder(exec);
        let legs = [self.stop_order.take(), self.limit_order.take(), self.exit_order.take()];
        for leg in legs.into_iter().flatten().filter(|leg| leg.resident) {
            if let Err(err) = cancel_leg(exec, &self.market_id, &leg) {
                debug!(trade_id = %self.id, error = %err, "cancel on removal failed");
            }
        }
    }

    /// Once exits have closed the trade, cancel what is left of the entry so
    /// it cannot reopen the position. Returns `true` when an order was canceled.
    pub fn settle_exit(&mut self, exec: &dyn TradingExecution) -> bool {
        self.is_closed() && self.cancel_entry_remainder(exec)
    }

    fn cancel_entry_remainder(&mut self, exec: &dyn TradingExecution) -> bool {
        let Some(leg) = self.entry.as_mut().filter(|leg| leg.resident) else {
            return false;
        };
        leg.resident = false;
        let leg = leg.clone();
        match cancel_leg(exec, &self.market_id, &leg) {
            Ok(()) => true,
            Err(err) => {
                warn!(trade_id = %self.id, error = %err, "cancel of entry order failed");
                false
            }
        }
    }
}

/// Cancel a leg on the venue. An order the venue no longer knows is gone already.
fn cancel_leg(exec: &dyn TradingExecution, market_id: &str, leg: &OrderLeg) -> Result<(), ExecutionError> {
    let Some(order_id) = leg.order_id.as_ref() else {
        return Ok(());
    };
    match exec.cancel_order(market_id, order_id) {
        Ok(()) | Err(ExecutionError::UnknownOrder(_)) => Ok(()),
        Err(err) => Err(err),
    }
}
