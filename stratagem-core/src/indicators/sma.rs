//! Simple Moving Average (SMA) of closes.
//!
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self { period, name: format!("sma_{period}") }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        sma_of_series(&closes, self.period)
    }
}

/// Rolling mean over `period` values. A window containing NaN yields NaN.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for end in period..=n {
        let window = &values[end - period..end];
        if window.iter().all(|v| v.is_finite()) {
            result[end - 1] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}
