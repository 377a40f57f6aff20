//! Operations attached to a trade and run on every update pass.

use super::Trade;
use crate::domain::{Direction, Instrument};
use crate::execution::TradingExecution;
use crate::risk::RatchetState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeOperation {
    /// Move the stop to the entry price once the trade gains `trigger_rate`.
    BreakevenMove {
        trigger_rate: f64,
        #[serde(default)]
        done: bool,
    },
    /// Move the stop to `stop` once the price reaches `trigger`.
    StepStopLoss {
        trigger: f64,
        stop: f64,
        #[serde(default)]
        done: bool,
    },
    /// Keep the stop `distance_rate` behind the close price.
    TrailingStop { distance_rate: f64 },
}

impl TradeOperation {
    pub fn is_done(&self) -> bool {
        match self {
            TradeOperation::BreakevenMove { done, .. } | TradeOperation::StepStopLoss { done, .. } => *done,
            TradeOperation::TrailingStop { .. } => false,
        }
    }

    /// Whether the operation makes sense for `trade`.
    pub fn check(&self, trade: &Trade) -> bool {
        match *self {
            TradeOperation::BreakevenMove { trigger_rate, .. } => trigger_rate.is_finite() && trigger_rate > 0.0,
            TradeOperation::StepStopLoss { trigger, stop, .. } => {
                trigger > 0.0 && stop > 0.0 && trigger.is_finite() && trade.direction.better(trigger, stop)
            }
            TradeOperation::TrailingStop { distance_rate } => distance_rate > 0.0 && distance_rate < 1.0,
        }
    }

    /// Stop level the operation asks for at the current close price, if triggered.
    fn proposal(&mut self, trade: &Trade, close_price: f64) -> Option<f64> {
        match self {
            TradeOperation::BreakevenMove { trigger_rate, done } => {
                if *done || trade.entry_price <= 0.0 || trade.profit_rate_at(close_price) < *trigger_rate {
                    return None;
                }
                *done = true;
                Some(trade.entry_price)
            }
            TradeOperation::StepStopLoss { trigger, stop, done } => {
                if *done || trade.direction.better(*trigger, close_price) {
                    return None;
                }
                *done = true;
                Some(*stop)
            }
            TradeOperation::TrailingStop { distance_rate } => {
                let offset = match trade.direction {
                    Direction::Long => 1.0 - *distance_rate,
                    Direction::Short => 1.0 + *distance_rate,
                };
                Some(close_price * offset)
            }
        }
    }

    /// Run the operation against `trade`. Returns `true` when the stop moved.
    pub fn test_and_operate(
        &mut self,
        trade: &mut Trade,
        instrument: &Instrument,
        exec: &dyn TradingExecution,
        now: DateTime<Utc>,
        min_interval: Duration,
    ) -> bool {
        let close_price = instrument.close_exec_price(trade.direction);
        if !(close_price > 0.0) {
            return false;
        }
        let Some(proposed) = self.proposal(trade, close_price) else {
            return false;
        };
        let proposed = instrument.adjust_price(proposed);
        if !RatchetState::new(trade.direction, trade.stop_loss).tightens(proposed) {
            return false;
        }
        if let Err(err) = trade.modify_stop_loss(exec, instrument, proposed, now, min_interval) {
            warn!(trade_id = %trade.id, error = %err, "operation stop update failed");
        }
        true
    }
}

impl Trade {
    /// Attach an operation after validating it. Returns `false` when rejected.
    pub fn add_operation(&mut self, operation: TradeOperation) -> bool {
        if self.is_terminal() || !operation.check(self) {
            return false;
        }
        self.operations.push(operation);
        true
    }

    /// Run every attached operation once and drop the finished ones.
    pub fn run_operations(&mut self, exec: &dyn TradingExecution, instrument: &Instrument, now: DateTime<Utc>, min_interval: Duration) {
        if !self.is_active() {
            return;
        }
        let mut operations = std::mem::take(&mut self.operations);
        for operation in operations.iter_mut() {
            operation.test_and_operate(self, instrument, exec, now, min_interval);
        }
        if !self.is_terminal() {
            operations.retain(|op| !op.is_done());
            self.operations = operations;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Timeframe, TradeId};
    use crate::execution::PaperExecution;
    use crate::trade::tests::{instrument, ts};

    fn active(direction: Direction) -> Trade {
        let mut trade = Trade::new(TradeId(1), &instrument(), direction, Timeframe::M3);
        trade.order_quantity = 1.0;
        trade.apply_entry_fill(1.0, 100.0, None, None, false);
        trade.stop_loss = Some(match direction {
            Direction::Long => 95.0,
            Direction::Short => 105.0,
        });
        trade
    }

    #[test]
    fn check_rejects_nonsense() {
        let trade = active(Direction::Long);
        assert!(!TradeOperation::StepStopLoss { trigger: 100.0, stop: 101.0, done: false }.check(&trade));
        assert!(TradeOperation::StepStopLoss { trigger: 105.0, stop: 101.0, done: false }.check(&trade));
        assert!(!TradeOperation::TrailingStop { distance_rate: 1.5 }.check(&trade));
        assert!(!TradeOperation::BreakevenMove { trigger_rate: -0.1, done: false }.check(&trade));
    }

    #[test]
    fn breakeven_moves_stop_once() {
        let exec = PaperExecution::new();
        let mut inst = instrument();
        let mut trade = active(Direction::Long);
        assert!(trade.add_operation(TradeOperation::BreakevenMove { trigger_rate: 0.02, done: false }));

        trade.run_operations(&exec, &inst, ts(0), Duration::seconds(60));
        assert_eq!(trade.stop_loss, Some(95.0));

        inst.bid = 103.0;
        inst.ask = 103.1;
        trade.run_operations(&exec, &inst, ts(1), Duration::seconds(60));
        assert_eq!(trade.stop_loss, Some(100.0));
        assert!(trade.operations.is_empty());
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let exec = PaperExecution::new();
        let mut inst = instrument();
        let mut trade = active(Direction::Short);
        assert!(trade.add_operation(TradeOperation::TrailingStop { distance_rate: 0.02 }));

        inst.bid = 89.9;
        inst.ask = 90.0;
        trade.run_operations(&exec, &inst, ts(0), Duration::seconds(60));
        assert_eq!(trade.stop_loss, Some(91.8));

        inst.bid = 94.9;
        inst.ask = 95.0;
        trade.run_operations(&exec, &inst, ts(120), Duration::seconds(60));
        assert_eq!(trade.stop_loss, Some(91.8));
        assert_eq!(trade.operations.len(), 1);
    }

    #[test]
    fn persisted_shape() {
        let op = TradeOperation::StepStopLoss { trigger: 105.0, stop: 101.0, done: false };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "STEP_STOP_LOSS");
        let back: TradeOperation = serde_json::from_str(r#"{"type":"TRAILING_STOP","distance_rate":0.01}"#).unwrap();
        assert_eq!(back, TradeOperation::TrailingStop { distance_rate: 0.01 });
    }
}
