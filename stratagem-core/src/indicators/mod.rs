//! Indicators consumed by the timeframe analyzers.
//!
//! Indicators are pure functions over a candle history: candles in, a numeric
//! series of the same length out. The first `lookback()` values are `NaN`.
//! Analyzers recompute them on every closed candle over a bounded window, so
//! the series never grows past the analyzer's configured depth.

pub mod atr;
pub mod ema;
pub mod pivot;
pub mod rsi;
pub mod sma;

pub use atr::Atr;
pub use ema::Ema;
pub use pivot::{PivotLadder, PivotPoints};
pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::Candle;

/// Trait for indicators.
///
/// No value at index t may depend on candles after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;

    /// Last valid value of the series, if any.
    fn last(&self, candles: &[Candle]) -> Option<f64> {
        self.compute(candles).last().copied().filter(|v| v.is_finite())
    }
}

/// Create synthetic one-minute candles from close prices for testing.
///
/// open = prev_close (or close for the first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use crate::domain::Timeframe;
    use chrono::{TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                timestamp: base + chrono::Duration::minutes(i as i64),
                timeframe: Timeframe::M1,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                ended: true,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
