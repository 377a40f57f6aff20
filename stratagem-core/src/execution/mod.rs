//! Execution seam: how trades reach the exchange.
//!
//! The strategy trader only ever submits and cancels orders through
//! [`TradingExecution`]. Implementations must not call back into the trader
//! synchronously: fills known at submission time come back in the
//! [`OrderAck`], everything later arrives as [`crate::events::OrderEvent`]s.

pub mod paper;

pub use paper::{ExecutionCall, PaperExecution};

use crate::domain::{Direction, OrderId, RefId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order type of a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
    Stop { trigger: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market_id: String,
    pub ref_id: RefId,
    /// Buy for long, sell for short.
    pub direction: Direction,
    pub kind: OrderKind,
    pub quantity: f64,
    pub reduce_only: bool,
    /// Current execution price on the order's side.
    pub price_hint: f64,
    pub leverage: f64,
    pub hedging: bool,
}

/// Fill reported synchronously by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImmediateFill {
    pub quantity: f64,
    pub price: f64,
    pub maker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub fill: Option<ImmediateFill>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("execution venue unavailable: {0}")]
    Unavailable(String),
}

/// Trait for execution venues.
pub trait TradingExecution: Send + Sync {
    fn name(&self) -> &str;

    fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, ExecutionError>;

    fn cancel_order(&self, market_id: &str, order_id: &OrderId) -> Result<(), ExecutionError>;
}
