//! Momentum crossover analyzer.
//!
//! Fast EMA crossing the slow SMA, confirmed by RSI not being stretched in the
//! signal direction. The opposite crossing exits trades of that direction.

use super::{base_state, crossed_above, last_two, Analysis, TimeframeAnalyzer};
use crate::domain::{Candle, Direction, Timeframe};
use crate::indicators::{Atr, Ema, Indicator, Rsi, Sma};
use crate::signal::Signal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct MomentumCrossover {
    timeframe: Timeframe,
    depth: usize,
    ema: Ema,
    sma: Sma,
    rsi: Rsi,
    atr: Atr,
    atr_multiplier: f64,
    /// RSI (0..100) at or below which shorts are considered stretched.
    rsi_low: f64,
    /// RSI (0..100) at or above which longs are considered stretched.
    rsi_high: f64,
    warmup: usize,
}

impl MomentumCrossover {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timeframe: Timeframe,
        depth: usize,
        ema_period: usize,
        sma_period: usize,
        rsi_period: usize,
        rsi_low: f64,
        rsi_high: f64,
        atr_period: usize,
        atr_multiplier: f64,
    ) -> Self {
        let warmup = [ema_period, sma_period, rsi_period + 1, atr_period + 1].into_iter().max().unwrap_or(1) + 1;
        Self {
            timeframe,
            depth,
            ema: Ema::new(ema_period),
            sma: Sma::new(sma_period),
            rsi: Rsi::new(rsi_period),
            atr: Atr::new(atr_period),
            atr_multiplier,
            rsi_low,
            rsi_high,
            warmup,
        }
    }
}

impl TimeframeAnalyzer for MomentumCrossover {
    fn name(&self) -> &str {
        "momentum_crossover"
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn depth(&self) -> usize {
        self.depth.max(self.warmup)
    }

    fn warmup(&self) -> usize {
        self.warmup
    }

    fn analyze(&self, candles: &[Candle], timestamp: DateTime<Utc>) -> Analysis {
        let mut state = base_state(self.timeframe, candles, &self.atr, self.atr_multiplier);
        let mut analysis = Analysis { state: state.clone(), entries: Vec::new(), exits: Vec::new() };
        if candles.len() < self.warmup {
            return analysis;
        }

        let (Some((fast_prev, fast)), Some((slow_prev, slow)), Some(rsi)) = (
            last_two(&self.ema.compute(candles)),
            last_two(&self.sma.compute(candles)),
            self.rsi.last(candles),
        ) else {
            return analysis;
        };

        state.can_long = fast > slow;
        state.can_short = fast < slow;

        let price = state.last_close;
        let bullish = crossed_above(fast_prev, fast, slow_prev, slow);
        let bearish = crossed_above(slow_prev, slow, fast_prev, fast);

        if bullish {
            if rsi < self.rsi_high {
                analysis.entries.push(self.entry(Direction::Long, price, timestamp, &state));
            }
            analysis.exits.push(Signal::exit(Direction::Short, self.timeframe, price, timestamp));
        } else if bearish {
            if rsi > self.rsi_low {
                analysis.entries.push(self.entry(Direction::Short, price, timestamp, &state));
            }
            analysis.exits.push(Signal::exit(Direction::Long, self.timeframe, price, timestamp));
        }

        analysis.state = state;
        analysis
    }
}

impl MomentumCrossover {
    fn entry(&self, direction: Direction, price: f64, timestamp: DateTime<Utc>, state: &super::TimeframeState) -> Signal {
        let signal = Signal::entry(direction, self.timeframe, price, timestamp);
        match state.stop_loss(direction) {
            Some(stop) => signal.with_stop_loss(stop),
            None => signal,
        }
    }
}
