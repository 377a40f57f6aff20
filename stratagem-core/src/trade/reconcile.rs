//! Merging asynchronous exchange events into a trade.

use super::{Trade, TradeState};
use crate::domain::{OrderId, PositionId, RefId};
use crate::events::{OrderEvent, PositionEvent};
use tracing::debug;

/// Which of the trade's orders an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    Entry,
    Stop,
    Limit,
    Exit,
}

impl Trade {
    pub fn leg_of(&self, order_id: &OrderId, ref_id: Option<&RefId>) -> Option<LegKind> {
        let hit = |leg: &Option<super::OrderLeg>| leg.as_ref().is_some_and(|l| l.matches(order_id, ref_id));
        if hit(&self.entry) {
            Some(LegKind::Entry)
        } else if hit(&self.stop_order) {
            Some(LegKind::Stop)
        } else if hit(&self.limit_order) {
            Some(LegKind::Limit)
        } else if hit(&self.exit_order) {
            Some(LegKind::Exit)
        } else {
            None
        }
    }

    pub fn is_target_order(&self, order_id: &OrderId, ref_id: Option<&RefId>) -> bool {
        self.leg_of(order_id, ref_id).is_some()
    }

    /// A position belongs to the trade by id, or by the reference of the entry order that opened it.
    pub fn is_target_position(&self, position_id: &PositionId, ref_id: Option<&RefId>) -> bool {
        self.position_id.as_ref() == Some(position_id)
            || ref_id.is_some_and(|r| self.entry.as_ref().is_some_and(|leg| &leg.ref_id == r))
    }

    /// Apply an order event. Returns `false` when the event is not for this trade.
    pub fn order_signal(&mut self, event: &OrderEvent) -> bool {
        let Some(leg) = self.leg_of(event.order_id(), event.ref_id()) else {
            return false;
        };
        debug!(trade_id = %self.id, order_id = %event.order_id(), ?leg, "order event");

        match event {
            OrderEvent::Opened(update) | OrderEvent::Updated(update) => {
                if let Some(l) = self.leg_mut(leg) {
                    l.order_id.get_or_insert_with(|| update.order_id.clone());
                }
                if leg == LegKind::Entry && self.state == TradeState::Created {
                    self.set_state(TradeState::EntryPending);
                }
            }
            OrderEvent::Traded(fill) => match leg {
                LegKind::Entry => {
                    self.apply_entry_fill(fill.quantity, fill.exec_price, fill.cumulative, fill.avg_price, fill.maker);
                    if fill.fully_filled {
                        if let Some(l) = self.entry.as_mut() {
                            l.resident = false;
                        }
                    }
                }
                LegKind::Stop | LegKind::Limit | LegKind::Exit => {
                    if let Some(l) = self.leg_mut(leg) {
                        l.filled += fill.quantity;
                        if fill.fully_filled {
                            l.resident = false;
                        }
                    }
                    self.apply_exit_fill(fill.quantity, fill.exec_price, fill.maker);
                    if fill.fully_filled {
                        self.drop_protective(leg);
                    }
                }
            },
            OrderEvent::Canceled(_) | OrderEvent::Deleted(_) | OrderEvent::Rejected(_) => {
                let rejected = matches!(event, OrderEvent::Rejected(_));
                match leg {
                    LegKind::Entry => {
                        if let Some(l) = self.entry.as_mut() {
                            l.resident = false;
                        }
                        if self.exec_entry_qty <= 0.0 && !self.is_terminal() {
                            self.set_state(if rejected { TradeState::Rejected } else { TradeState::Canceled });
                        }
                    }
                    LegKind::Stop | LegKind::Limit => self.drop_protective(leg),
                    LegKind::Exit => {
                        if let Some(l) = self.exit_order.as_mut() {
                            l.resident = false;
                        }
                        // The close did not go through: let the next pass retry it.
                        if self.is_closing() && self.open_quantity() > 0.0 {
                            self.set_state(TradeState::Active);
                        }
                    }
                }
            }
        }
        true
    }

    /// Apply a position event. Returns `false` when the event is not for this trade.
    pub fn position_signal(&mut self, event: &PositionEvent) -> bool {
        let update = event.update();
        if !self.is_target_position(&update.position_id, update.ref_order_id.as_ref()) {
            return false;
        }
        self.position_id.get_or_insert_with(|| update.position_id.clone());

        match event {
            PositionEvent::Opened(_) | PositionEvent::Updated(_) => {
                if self.exec_entry_qty <= 0.0 && update.quantity > 0.0 {
                    let price = update.avg_price.unwrap_or(self.order_price);
                    self.apply_entry_fill(update.quantity, price, Some(update.quantity), update.avg_price, false);
                }
            }
            PositionEvent::Deleted(_) => {
                if !self.is_terminal() {
                    self.set_state(TradeState::Closed);
                }
            }
        }
        true
    }

    fn leg_mut(&mut self, leg: LegKind) -> Option<&mut super::OrderLeg> {
        match leg {
            LegKind::Entry => self.entry.as_mut(),
            LegKind::Stop => self.stop_order.as_mut(),
            LegKind::Limit => self.limit_order.as_mut(),
            LegKind::Exit => self.exit_order.as_mut(),
        }
    }

    fn drop_protective(&mut self, leg: LegKind) {
        match leg {
            LegKind::Stop => self.stop_order = None,
            LegKind::Limit => self.limit_order = None,
            LegKind::Entry | LegKind::Exit => {}
        }
    }
}
