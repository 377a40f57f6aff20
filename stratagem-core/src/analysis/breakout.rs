//! Pivot breakout analyzer.
//!
//! Uses the ladder of the period the last candle belongs to (built from the
//! candle before it). A close through R1 enters long, through S1 enters short.
//! A close back through the pivot exits trades of that direction. The trend is
//! the close relative to its SMA.

use super::{base_state, last_two, Analysis, TimeframeAnalyzer};
use crate::domain::{Candle, Direction, Timeframe};
use crate::indicators::{Atr, Indicator, PivotLadder, Sma};
use crate::signal::Signal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PivotBreakout {
    timeframe: Timeframe,
    depth: usize,
    sma: Sma,
    atr: Atr,
    atr_multiplier: f64,
    warmup: usize,
}

impl PivotBreakout {
    pub fn new(timeframe: Timeframe, depth: usize, sma_period: usize, atr_period: usize, atr_multiplier: f64) -> Self {
        Self {
            timeframe,
            depth,
            sma: Sma::new(sma_period),
            atr: Atr::new(atr_period),
            atr_multiplier,
            warmup: sma_period.max(atr_period + 1).max(2),
        }
    }
}

impl TimeframeAnalyzer for PivotBreakout {
    fn name(&self) -> &str {
        "pivot_breakout"
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
        let Some(sma) = self.sma.last(candles) else {
            return analysis;
        };
        state.can_long = state.last_close > sma;
        state.can_short = state.last_close < sma;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let (Some((prev, last)), Some(period)) = (last_two(&closes), candles.len().checked_sub(2).map(|i| PivotLadder::from_candle(&candles[i]))) else {
            analysis.state = state;
            return analysis;
        };

        for direction in [Direction::Long, Direction::Short] {
            let s = direction.sign();
            let breakout = period.target(direction, 1);
            if prev * s <= breakout * s && last * s > breakout * s && state.allows(direction) {
                let mut entry = Signal::entry(direction, self.timeframe, last, timestamp);
                if let Some(stop) = state.stop_loss(direction) {
                    entry = entry.with_stop_loss(stop);
                }
                analysis.entries.push(entry);
            }
            if prev * s >= period.pivot * s && last * s < period.pivot * s {
                analysis.exits.push(Signal::exit(direction, self.timeframe, last, timestamp));
            }
        }

        analysis.state = state;
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn analyzer() -> PivotBreakout {
        PivotBreakout::new(Timeframe::H1, 64, 3, 2, 1.5)
    }

    fn run(closes: &[f64]) -> Analysis {
        let candles = make_candles(closes);
        let ts = candles.last().map(|c| c.timestamp).unwrap();
        analyzer().analyze(&candles, ts)
    }

    #[test]
    fn breakout_above_r1_enters_long() {
        // Candle before last: open 100, close 100, high 101, low 99 -> P 100, R1 101.
        let a = run(&[100.0, 100.0, 100.0, 103.0]);
        assert!(a.state.can_long);
        assert_eq!(a.entries.len(), 1);
        assert_eq!(a.entries[0].direction, Direction::Long);
        assert!(a.entries[0].stop_loss.is_some());
        // The close also rose through the pivot, which exits shorts.
        assert!(a.exits.iter().all(|s| s.direction == Direction::Short));
    }

    #[test]
    fn breakdown_below_s1_enters_short_and_exits_longs() {
        let a = run(&[100.0, 100.0, 100.0, 97.0]);
        assert!(a.state.can_short);
        assert_eq!(a.entries.len(), 1);
        assert_eq!(a.entries[0].direction, Direction::Short);
        assert_eq!(a.exits.len(), 1);
        assert_eq!(a.exits[0].direction, Direction::Long);
    }

    #[test]
    fn inside_range_is_quiet() {
        let a = run(&[100.0, 100.0, 100.2, 100.5]);
        assert!(a.entries.is_empty());
        assert!(a.exits.is_empty());
    }

    #[test]
    fn short_history_yields_state_only() {
        let a = run(&[100.0, 101.0]);
        assert!(a.entries.is_empty());
        assert!(!a.state.can_long);
        assert_eq!(a.state.last_close, 101.0);
    }
}
