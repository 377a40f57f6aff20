use crate::domain::{Direction, Tick};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tick/lot rounding policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TickPolicy {
    /// Reject values that aren't already step-aligned
    Reject,
    /// Round to nearest step
    RoundNearest,
    /// Round down
    RoundDown,
    /// Round up
    RoundUp,
}

/// How positions are carried on this market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    /// Asset bought outright, long only.
    Spot,
    /// Shared-margin positions, long or short.
    Margin,
    /// One isolated margin position per trade.
    IndividualMargin,
}

/// Live market metadata and quote for the instrument a strategy trader runs on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub market_id: String,
    pub symbol: String,
    pub trade_mode: TradeMode,
    pub bid: f64,
    pub ask: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub vol24h_base: f64,
    pub vol24h_quote: f64,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub tick_size: f64,
    pub lot_size: f64,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_notional: f64,
    /// Quantity submitted per entry, before lot adjustment.
    pub trade_quantity: f64,
    pub leverage: f64,
    pub tradeable: bool,
}

impl Instrument {
    /// Create a tradeable instrument with no quote yet.
    pub fn new(market_id: impl Into<String>, trade_mode: TradeMode, tick_size: f64, lot_size: f64) -> Self {
        let market_id = market_id.into();
        Self {
            symbol: market_id.clone(),
            market_id,
            trade_mode,
            bid: 0.0,
            ask: 0.0,
            last_update: None,
            vol24h_base: 0.0,
            vol24h_quote: 0.0,
            maker_fee: 0.0,
            taker_fee: 0.0,
            tick_size,
            lot_size,
            price_precision: decimals_of(tick_size),
            quantity_precision: decimals_of(lot_size),
            min_notional: 0.0,
            trade_quantity: 0.0,
            leverage: 1.0,
            tradeable: true,
        }
    }

    /// Apply a market data tick.
    pub fn update_tick(&mut self, tick: &Tick) {
        self.bid = tick.bid;
        self.ask = tick.ask;
        self.last_update = Some(tick.timestamp);
    }

    pub fn update_volume(&mut self, vol24h_base: f64, vol24h_quote: f64) {
        self.vol24h_base = vol24h_base;
        self.vol24h_quote = vol24h_quote;
    }

    pub fn has_quote(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0
    }

    pub fn is_margin(&self) -> bool {
        self.trade_mode != TradeMode::Spot
    }

    pub fn market_price(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    /// Price paid to open a position in `direction` (long buys at the ask).
    pub fn open_exec_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.ask,
            Direction::Short => self.bid,
        }
    }

    /// Price received to close a position in `direction` (long sells at the bid).
    pub fn close_exec_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.bid,
            Direction::Short => self.ask,
        }
    }

    pub fn fee_rate(&self, maker: bool) -> f64 {
        if maker {
            self.maker_fee
        } else {
            self.taker_fee
        }
    }

    pub fn notional(&self, quantity: f64, price: f64) -> f64 {
        quantity * price
    }

    /// Round price according to policy
    pub fn round_price(&self, price: f64, policy: TickPolicy) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        let ticks = price / self.tick_size;
        let rounded_ticks = match policy {
            TickPolicy::RoundNearest => ticks.round(),
            TickPolicy::RoundDown => (ticks + STEP_EPSILON).floor(),
            TickPolicy::RoundUp => (ticks - STEP_EPSILON).ceil(),
            TickPolicy::Reject => ticks,
        };
        truncate_noise(rounded_ticks * self.tick_size, self.price_precision)
    }

    /// Nearest tick-aligned price.
    pub fn adjust_price(&self, price: f64) -> f64 {
        self.round_price(price, TickPolicy::RoundNearest)
    }

    /// Largest lot-aligned quantity not above `quantity`.
    pub fn adjust_quantity(&self, quantity: f64) -> f64 {
        if self.lot_size <= 0.0 {
            return quantity.max(0.0);
        }
        let lots = (quantity / self.lot_size + STEP_EPSILON).floor().max(0.0);
        truncate_noise(lots * self.lot_size, self.quantity_precision)
    }

    /// Validate price respects tick size
    pub fn validate_price(&self, price: f64, policy: TickPolicy) -> Result<f64, InstrumentError> {
        if policy == TickPolicy::Reject && self.tick_size > 0.0 {
            let ticks = price / self.tick_size;
            if (ticks - ticks.round()).abs() > 1e-8 {
                return Err(InstrumentError::InvalidTickSize { price, tick_size: self.tick_size });
            }
        }
        Ok(self.round_price(price, policy))
    }

    /// Validate quantity respects lot size
    pub fn validate_quantity(&self, qty: f64, policy: TickPolicy) -> Result<f64, InstrumentError> {
        if qty < 0.0 || !qty.is_finite() {
            return Err(InstrumentError::InvalidQuantity { quantity: qty });
        }
        if self.lot_size <= 0.0 {
            return Ok(qty);
        }
        let lots = qty / self.lot_size;

        if policy == TickPolicy::Reject && (lots - lots.round()).abs() > 1e-8 {
            return Err(InstrumentError::InvalidLotSize { quantity: qty, lot_size: self.lot_size });
        }

        let rounded_lots = match policy {
            TickPolicy::RoundNearest => lots.round(),
            TickPolicy::RoundDown => (lots + STEP_EPSILON).floor(),
            TickPolicy::RoundUp => (lots - STEP_EPSILON).ceil(),
            TickPolicy::Reject => lots,
        };
        Ok(truncate_noise(rounded_lots * self.lot_size, self.quantity_precision))
    }

    pub fn format_price(&self, price: f64) -> String {
        format!("{:.*}", self.price_precision as usize, price)
    }

    pub fn format_quantity(&self, quantity: f64) -> String {
        format!("{:.*}", self.quantity_precision as usize, quantity)
    }
}

/// Slack for float division landing a hair below an exact step.
const STEP_EPSILON: f64 = 1e-9;

/// Number of decimals needed to print a step such as 0.001.
fn decimals_of(step: f64) -> u32 {
    if step <= 0.0 || !step.is_finite() {
        return 8;
    }
    let mut decimals = 0;
    let mut scaled = step;
    while decimals < 12 && (scaled - scaled.round()).abs() > 1e-9 * scaled.max(1.0) {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

fn truncate_noise(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Price {price} does not respect tick_size {tick_size}")]
    InvalidTickSize { price: f64, tick_size: f64 },

    #[error("Quantity {quantity} does not respect lot_size {lot_size}")]
    InvalidLotSize { quantity: f64, lot_size: f64 },

    #[error("Quantity {quantity} is negative or not finite")]
    InvalidQuantity { quantity: f64 },
}
