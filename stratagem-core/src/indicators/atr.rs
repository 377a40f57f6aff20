//! Average True Range (ATR) with Wilder smoothing.
//!
//! TR[t] = max(high-low, |high-prev_close|, |low-prev_close|), undefined at t = 0.
//! Lookback: period.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period, name: format!("atr_{period}") }
    }
}

/// True range series. The first value is NaN since it has no previous close.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; candles.len()];
    for (i, pair) in candles.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        tr[i + 1] = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
    }
    tr
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` consecutive valid values.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let Some(seed_start) = (0..=n - period).find(|&i| values[i..i + period].iter().all(|v| v.is_finite())) else {
        return result;
    };
    let seed_end = seed_start + period;
    let mut prev = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if !values[i].is_finite() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        wilder_smooth(&true_range(candles), self.period)
    }
}
