//! Relative Strength Index (RSI), 0..100, Wilder-smoothed gains and losses.
//!
//! Lookback: period. No movement at all reads 50.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period, name: format!("rsi_{period}") }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period + 1 {
            return result;
        }

        let changes: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
        if changes[..self.period].iter().any(|c| c.is_nan()) {
            return result;
        }

        let period = self.period as f64;
        let mut avg_gain = changes[..self.period].iter().map(|c| c.max(0.0)).sum::<f64>() / period;
        let mut avg_loss = changes[..self.period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period;
        result[self.period] = compute_rsi(avg_gain, avg_loss);

        let alpha = 1.0 / period;
        for (i, &change) in changes.iter().enumerate().skip(self.period) {
            if change.is_nan() {
                break;
            }
            avg_gain = alpha * change.max(0.0) + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * (-change).max(0.0) + (1.0 - alpha) * avg_loss;
            result[i + 1] = compute_rsi(avg_gain, avg_loss);
        }
        result
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
