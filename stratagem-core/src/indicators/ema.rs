//! Exponential Moving Average (EMA) of closes.
//!
//! EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seeded with the SMA of the first `period` closes. Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period, name: format!("ema_{period}") }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA of an arbitrary series. NaN in the seed window gives an all-NaN result,
/// NaN after the seed taints everything that follows.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;

    let alpha = 2.0 / (period as f64 + 1.0);
    for i in period..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn ema_period_1_equals_close() {
        let result = Ema::new(1).compute(&make_candles(&[100.0, 200.0, 300.0]));
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed SMA(10,11,12) = 11
        let result = Ema::new(3).compute(&make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]));
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_nan_after_seed_propagates() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        candles[3].close = f64::NAN;
        let result = Ema::new(3).compute(&candles);
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
    }

    #[test]
    fn ema_lookback() {
        assert_eq!(Ema::new(20).lookback(), 19);
    }
}
