//! Asynchronous exchange events, routed to trades by order or position id.

use crate::domain::{OrderId, PositionId, RefId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order acknowledged or amended by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub market_id: String,
    pub order_id: OrderId,
    pub ref_id: Option<RefId>,
    pub timestamp: DateTime<Utc>,
}

/// Execution report for one fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub market_id: String,
    pub order_id: OrderId,
    pub ref_id: Option<RefId>,
    pub timestamp: DateTime<Utc>,
    /// Quantity of this fill.
    pub quantity: f64,
    /// Total filled on the order so far, when the venue reports it.
    pub cumulative: Option<f64>,
    pub exec_price: f64,
    /// Average fill price of the order so far, when the venue reports it.
    pub avg_price: Option<f64>,
    pub maker: bool,
    pub fully_filled: bool,
}

/// Order identity for terminal order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRef {
    pub market_id: String,
    pub order_id: OrderId,
    pub ref_id: Option<RefId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    Opened(OrderUpdate),
    Updated(OrderUpdate),
    Traded(OrderFill),
    Canceled(OrderRef),
    Rejected(OrderRef),
    Deleted(OrderRef),
}

impl OrderEvent {
    pub fn market_id(&self) -> &str {
        match self {
            OrderEvent::Opened(u) | OrderEvent::Updated(u) => &u.market_id,
            OrderEvent::Traded(f) => &f.market_id,
            OrderEvent::Canceled(r) | OrderEvent::Rejected(r) | OrderEvent::Deleted(r) => &r.market_id,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::Opened(u) | OrderEvent::Updated(u) => &u.order_id,
            OrderEvent::Traded(f) => &f.order_id,
            OrderEvent::Canceled(r) | OrderEvent::Rejected(r) | OrderEvent::Deleted(r) => &r.order_id,
        }
    }

    pub fn ref_id(&self) -> Option<&RefId> {
        match self {
            OrderEvent::Opened(u) | OrderEvent::Updated(u) => u.ref_id.as_ref(),
            OrderEvent::Traded(f) => f.ref_id.as_ref(),
            OrderEvent::Canceled(r) | OrderEvent::Rejected(r) | OrderEvent::Deleted(r) => r.ref_id.as_ref(),
        }
    }
}

/// Margin position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub market_id: String,
    pub position_id: PositionId,
    /// Reference of the order that opened the position.
    pub ref_order_id: Option<RefId>,
    pub timestamp: DateTime<Utc>,
    pub quantity: f64,
    pub avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionEvent {
    Opened(PositionUpdate),
    Updated(PositionUpdate),
    Deleted(PositionUpdate),
}

impl PositionEvent {
    pub fn update(&self) -> &PositionUpdate {
        match self {
            PositionEvent::Opened(p) | PositionEvent::Updated(p) | PositionEvent::Deleted(p) => p,
        }
    }
}

/// Any event coming back from the execution layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeEvent {
    Order(OrderEvent),
    Position(PositionEvent),
}

impl From<OrderEvent> for ExchangeEvent {
    fn from(event: OrderEvent) -> Self {
        ExchangeEvent::Order(event)
    }
}

impl From<PositionEvent> for ExchangeEvent {
    fn from(event: PositionEvent) -> Self {
        ExchangeEvent::Position(event)
    }
}
