//! Candle and tick, the market data units consumed by the trader.

use crate::domain::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-of-book quote with traded volume since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>, bid: f64, ask: f64, volume: f64) -> Self {
        Self { timestamp, bid, ask, volume }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    /// Both sides positive and not crossed.
    pub fn is_sane(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask >= self.bid
    }
}

/// OHLCV candle for one timeframe bucket.
///
/// `timestamp` is the bucket start. `ended` is set once a later bucket has
/// been observed, which is the only point where analyzers may read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ended: bool,
}

impl Candle {
    /// Open a new candle from a single price.
    pub fn from_price(timestamp: DateTime<Utc>, timeframe: Timeframe, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            timeframe,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            ended: false,
        }
    }

    /// Fold one more trade price into the candle.
    pub fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// Basic sanity: positive prices and high/low enclosing open/close.
    pub fn is_sane(&self) -> bool {
        if [self.open, self.high, self.low, self.close].iter().any(|v| !v.is_finite()) {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }
}
