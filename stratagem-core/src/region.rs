//! Regions: user-defined price zones that gate signals.
//!
//! A region accepts a signal when the stage, direction and timeframe match
//! and the signal price lies inside the region's band at the signal time.
//! A region is disposable once it expires or the market reaches its
//! cancellation price. The cancellation side follows from where the price
//! sits: below the band it is reached by the bid, above the band by the ask.

use crate::domain::{Direction, RegionId, Timeframe};
use crate::signal::{Signal, SignalKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStage {
    Entry,
    Exit,
    Both,
}

/// Price band of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionShape {
    /// Constant band.
    Range { low: f64, high: f64 },
    /// Channel interpolated linearly from (`low_a`, `high_a`) at `start` to
    /// (`low_b`, `high_b`) at `end`. Undefined outside `[start, end]`.
    Trend {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        low_a: f64,
        high_a: f64,
        low_b: f64,
        high_b: f64,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum RegionError {
    #[error("region band must be finite and positive with low < high")]
    InvalidBand,

    #[error("trend region must start before it ends")]
    InvalidSpan,

    #[error("cancellation price {0} lies inside the region band")]
    CancellationInsideBand(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Assigned by the strategy trader on insertion.
    #[serde(default = "unassigned")]
    pub id: RegionId,
    pub stage: RegionStage,
    /// `None` accepts both directions.
    pub direction: Option<Direction>,
    /// `None` accepts every timeframe.
    pub timeframe: Option<Timeframe>,
    pub expiry: Option<DateTime<Utc>>,
    pub cancellation: Option<f64>,
    pub shape: RegionShape,
}

fn unassigned() -> RegionId {
    RegionId(0)
}

fn valid_band(low: f64, high: f64) -> bool {
    low.is_finite() && high.is_finite() && low > 0.0 && low < high
}

impl Region {
    pub fn range(stage: RegionStage, low: f64, high: f64) -> Self {
        Self {
            id: unassigned(),
            stage,
            direction: None,
            timeframe: None,
            expiry: None,
            cancellation: None,
            shape: RegionShape::Range { low, high },
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_cancellation(mut self, price: f64) -> Self {
        self.cancellation = Some(price);
        self
    }

    /// Band `(low, high)` at `timestamp`, if the region is defined then.
    pub fn band_at(&self, timestamp: DateTime<Utc>) -> Option<(f64, f64)> {
        match self.shape {
            RegionShape::Range { low, high } => Some((low, high)),
            RegionShape::Trend { start, end, low_a, high_a, low_b, high_b } => {
                if timestamp < start || timestamp > end {
                    return None;
                }
                let span = (end - start).num_milliseconds() as f64;
                let t = if span > 0.0 { (timestamp - start).num_milliseconds() as f64 / span } else { 0.0 };
                Some((low_a + (low_b - low_a) * t, high_a + (high_b - high_a) * t))
            }
        }
    }

    /// Structural validity, checked before a region is accepted or restored.
    pub fn check(&self) -> Result<(), RegionError> {
        let bands = match self.shape {
            RegionShape::Range { low, high } => vec![(low, high)],
            RegionShape::Trend { start, end, low_a, high_a, low_b, high_b } => {
                if start >= end {
                    return Err(RegionError::InvalidSpan);
                }
                vec![(low_a, high_a), (low_b, high_b)]
            }
        };
        if !bands.iter().all(|&(low, high)| valid_band(low, high)) {
            return Err(RegionError::InvalidBand);
        }
        if let Some(price) = self.cancellation {
            if !price.is_finite() || bands.iter().any(|&(low, high)| price >= low && price <= high) {
                return Err(RegionError::CancellationInsideBand(price));
            }
        }
        Ok(())
    }

    fn stage_accepts(&self, kind: SignalKind) -> bool {
        matches!(
            (self.stage, kind),
            (RegionStage::Both, _) | (RegionStage::Entry, SignalKind::Entry) | (RegionStage::Exit, SignalKind::Exit)
        )
    }

    /// Whether `signal` is allowed by this region at `timestamp`.
    pub fn test_region(&self, timestamp: DateTime<Utc>, signal: &Signal) -> bool {
        if !self.stage_accepts(signal.kind) {
            return false;
        }
        if self.direction.is_some_and(|d| d != signal.direction) {
            return false;
        }
        if self.timeframe.is_some_and(|tf| tf != signal.timeframe) {
            return false;
        }
        if self.expiry.is_some_and(|expiry| timestamp >= expiry) {
            return false;
        }
        self.band_at(timestamp).is_some_and(|(low, high)| signal.price >= low && signal.price <= high)
    }

    /// Expired, past the end of a trend channel, or cancellation price reached.
    pub fn can_delete(&self, timestamp: DateTime<Utc>, bid: f64, ask: f64) -> bool {
        if self.expiry.is_some_and(|expiry| timestamp >= expiry) {
            return true;
        }
        if let RegionShape::Trend { end, .. } = self.shape {
            if timestamp > end {
                return true;
            }
        }
        let Some(price) = self.cancellation else {
            return false;
        };
        match self.band_at(timestamp) {
            Some((low, _)) if price < low => bid > 0.0 && bid <= price,
            Some((_, high)) if price > high => ask >= price,
            _ => false,
        }
    }
}
