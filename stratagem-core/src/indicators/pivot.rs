//! Classic floor pivot points.
//!
//! From the previous candle's high H, low L and close C:
//! P = (H + L + C) / 3, R1 = 2P - L, S1 = 2P - H, R2 = P + (H - L),
//! S2 = P - (H - L), R3 = H + 2(P - L), S3 = L - 2(H - P).

use super::Indicator;
use crate::domain::{Candle, Direction};
use serde::{Deserialize, Serialize};

/// Pivot, three supports (S1..S3, descending) and three resistances (R1..R3, ascending).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PivotLadder {
    pub pivot: f64,
    pub supports: [f64; 3],
    pub resistances: [f64; 3],
}

impl PivotLadder {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        let range = high - low;
        Self {
            pivot,
            supports: [2.0 * pivot - high, pivot - range, low - 2.0 * (high - pivot)],
            resistances: [2.0 * pivot - low, pivot + range, high + 2.0 * (pivot - low)],
        }
    }

    pub fn from_candle(candle: &Candle) -> Self {
        Self::from_hlc(candle.high, candle.low, candle.close)
    }

    /// Profit-side level `tier` (1..=3) for a position in `direction`:
    /// resistances for longs, supports for shorts. Tier 0 is the pivot.
    pub fn target(&self, direction: Direction, tier: usize) -> f64 {
        if tier == 0 {
            return self.pivot;
        }
        let idx = tier.min(3) - 1;
        match direction {
            Direction::Long => self.resistances[idx],
            Direction::Short => self.supports[idx],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pivot.is_finite()
            && self.supports.iter().all(|v| v.is_finite())
            && self.resistances.iter().all(|v| v.is_finite())
    }
}

/// Pivot series computed from each previous candle. Lookback: 1.
#[derive(Debug, Clone, Default)]
pub struct PivotPoints;

impl PivotPoints {
    /// Ladder for the next period, built from the last candle.
    pub fn ladder(candles: &[Candle]) -> Option<PivotLadder> {
        candles.last().map(PivotLadder::from_candle).filter(PivotLadder::is_finite)
    }
}

impl Indicator for PivotPoints {
    fn name(&self) -> &str {
        "pivot"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let mut result = vec![f64::NAN; candles.len()];
        for (slot, prev) in result.iter_mut().skip(1).zip(candles) {
            *slot = PivotLadder::from_candle(prev).pivot;
        }
        result
    }
}
