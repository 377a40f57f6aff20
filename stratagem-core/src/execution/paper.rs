//! Paper execution venue.
//!
//! Market orders and marketable limits fill at once at the request's price
//! hint. Other limit and stop orders rest until [`PaperExecution::on_quote`]
//! sees a quote that reaches them. Every call is journaled.

use super::{ExecutionError, ImmediateFill, OrderAck, OrderKind, OrderRequest, TradingExecution};
use crate::domain::{Direction, OrderId};
use crate::events::{OrderEvent, OrderFill};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One call received by the venue.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionCall {
    Submit(OrderRequest),
    Cancel(OrderId),
}

#[derive(Debug, Default)]
struct Book {
    next_id: u64,
    resting: BTreeMap<u64, OrderRequest>,
    journal: Vec<ExecutionCall>,
    reject: Option<String>,
}

#[derive(Debug, Default)]
pub struct PaperExecution {
    book: Mutex<Book>,
}

impl PaperExecution {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every following submission with `reason`, or accept again with `None`.
    pub fn set_reject(&self, reason: Option<&str>) {
        self.book().reject = reason.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<ExecutionCall> {
        self.book().journal.clone()
    }

    /// Submitted requests, in order.
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.book()
            .journal
            .iter()
            .filter_map(|call| match call {
                ExecutionCall::Submit(request) => Some(request.clone()),
                ExecutionCall::Cancel(_) => None,
            })
            .collect()
    }

    pub fn resting_count(&self) -> usize {
        self.book().resting.len()
    }

    /// Match resting orders of `market_id` against a quote. Filled orders
    /// leave the book and are reported as `Traded` events.
    pub fn on_quote(&self, market_id: &str, bid: f64, ask: f64, timestamp: DateTime<Utc>) -> Vec<OrderEvent> {
        let mut book = self.book();
        let hits: Vec<(u64, f64, bool)> = book
            .resting
            .iter()
            .filter(|(_, request)| request.market_id == market_id)
            .filter_map(|(&id, request)| {
                let buy = request.direction == Direction::Long;
                match request.kind {
                    OrderKind::Limit { price } if (buy && ask <= price) || (!buy && bid >= price) => Some((id, price, true)),
                    OrderKind::Stop { trigger } if buy && ask >= trigger => Some((id, ask, false)),
                    OrderKind::Stop { trigger } if !buy && bid <= trigger => Some((id, bid, false)),
                    _ => None,
                }
            })
            .collect();

        hits.into_iter()
            .filter_map(|(id, price, maker)| {
                let request = book.resting.remove(&id)?;
                Some(OrderEvent::Traded(OrderFill {
                    market_id: request.market_id,
                    order_id: OrderId::from(id),
                    ref_id: Some(request.ref_id),
                    timestamp,
                    quantity: request.quantity,
                    cumulative: Some(request.quantity),
                    exec_price: price,
                    avg_price: Some(price),
                    maker,
                    fully_filled: true,
                }))
            })
            .collect()
    }
}

fn marketable(request: &OrderRequest) -> Option<f64> {
    match request.kind {
        OrderKind::Market => Some(request.price_hint),
        OrderKind::Limit { price } => {
            let crosses = match request.direction {
                Direction::Long => price >= request.price_hint,
                Direction::Short => price <= request.price_hint,
            };
            crosses.then_some(price)
        }
        OrderKind::Stop { .. } => None,
    }
}

impl TradingExecution for PaperExecution {
    fn name(&self) -> &str {
        "paper"
    }

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, ExecutionError> {
        let mut book = self.book();
        book.journal.push(ExecutionCall::Submit(request.clone()));
        if let Some(reason) = &book.reject {
            return Err(ExecutionError::Rejected(reason.clone()));
        }
        if !(request.quantity > 0.0) {
            return Err(ExecutionError::Rejected(format!("invalid quantity {}", request.quantity)));
        }

        book.next_id += 1;
        let id = book.next_id;
        let order_id = OrderId::from(id);

        match marketable(request) {
            Some(price) if price > 0.0 => Ok(OrderAck {
                order_id,
                fill: Some(ImmediateFill { quantity: request.quantity, price, maker: false }),
            }),
            Some(_) => Err(ExecutionError::Rejected("no price to fill at".into())),
            None => {
                book.resting.insert(id, request.clone());
                Ok(OrderAck { order_id, fill: None })
            }
        }
    }

    fn cancel_order(&self, market_id: &str, order_id: &OrderId) -> Result<(), ExecutionError> {
        let mut book = self.book();
        book.journal.push(ExecutionCall::Cancel(order_id.clone()));
        let key = order_id.0.parse::<u64>().ok().filter(|k| book.resting.get(k).is_some_and(|r| r.market_id == market_id));
        match key {
            Some(k) => {
                book.resting.remove(&k);
                Ok(())
            }
            None => Err(ExecutionError::UnknownOrder(order_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RefId;
    use chrono::TimeZone;

    fn request(direction: Direction, kind: OrderKind, hint: f64) -> OrderRequest {
        OrderRequest {
            market_id: "BTC".into(),
            ref_id: RefId("t1-entry-1".into()),
            direction,
            kind,
            quantity: 2.0,
            reduce_only: false,
            price_hint: hint,
            leverage: 1.0,
            hedging: false,
        }
    }

    #[test]
    fn market_fills_at_hint() {
        let venue = PaperExecution::new();
        let ack = venue.submit_order(&request(Direction::Long, OrderKind::Market, 100.5)).unwrap();
        let fill = ack.fill.unwrap();
        assert_eq!(fill.price, 100.5);
        assert_eq!(fill.quantity, 2.0);
        assert!(!fill.maker);
        assert_eq!(venue.resting_count(), 0);
    }

    #[test]
    fn marketable_limit_fills_and_passive_limit_rests() {
        let venue = PaperExecution::new();
        let ack = venue.submit_order(&request(Direction::Long, OrderKind::Limit { price: 101.0 }, 100.5)).unwrap();
        assert_eq!(ack.fill.map(|f| f.price), Some(101.0));
        let ack = venue.submit_order(&request(Direction::Long, OrderKind::Limit { price: 99.0 }, 100.5)).unwrap();
        assert!(ack.fill.is_none());
        assert_eq!(venue.resting_count(), 1);
    }

    #[test]
    fn quotes_trigger_resting_orders() {
        let venue = PaperExecution::new();
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        venue.submit_order(&request(Direction::Short, OrderKind::Stop { trigger: 95.0 }, 100.0)).unwrap();
        venue.submit_order(&request(Direction::Short, OrderKind::Limit { price: 110.0 }, 100.0)).unwrap();
        assert!(venue.on_quote("BTC", 96.0, 96.5, ts).is_empty());
        assert!(venue.on_quote("ETH", 90.0, 90.5, ts).is_empty());

        let events = venue.on_quote("BTC", 94.5, 95.0, ts);
        assert_eq!(events.len(), 1);
        match &events[0] {
            OrderEvent::Traded(fill) => {
                assert_eq!(fill.exec_price, 94.5);
                assert!(fill.fully_filled);
                assert!(!fill.maker);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(venue.resting_count(), 1);
    }

    #[test]
    fn cancel_and_reject() {
        let venue = PaperExecution::new();
        let ack = venue.submit_order(&request(Direction::Long, OrderKind::Stop { trigger: 105.0 }, 100.0)).unwrap();
        assert!(venue.cancel_order("BTC", &ack.order_id).is_ok());
        assert_eq!(venue.cancel_order("BTC", &ack.order_id), Err(ExecutionError::UnknownOrder(ack.order_id.clone())));

        venue.set_reject(Some("maintenance"));
        let err = venue.submit_order(&request(Direction::Long, OrderKind::Market, 100.0)).unwrap_err();
        assert_eq!(err, ExecutionError::Rejected("maintenance".into()));
        assert_eq!(venue.calls().len(), 4);
        assert_eq!(venue.submitted().len(), 2);
    }
}
