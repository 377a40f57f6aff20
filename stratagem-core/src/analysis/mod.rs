//! Timeframe analyzers.
//!
//! One analyzer runs per configured timeframe. Each owns an indicator recipe
//! and turns the closed candles of its timeframe into a [`TimeframeState`]
//! (trend, volatility stop, pivot ladder) plus zero or more entry and exit
//! [`Signal`]s tagged with that timeframe.
//!
//! Analyzers are pure: they never see trades, regions or the instrument.

pub mod breakout;
pub mod factory;
pub mod momentum;
pub mod series;

pub use breakout::PivotBreakout;
pub use factory::{build_analyzer, AnalyzerConfig, AnalyzerKind, FactoryError};
pub use momentum::MomentumCrossover;
pub use series::CandleSeries;

use crate::domain::{Candle, Direction, Timeframe};
use crate::indicators::{Atr, Indicator, PivotLadder, PivotPoints};
use crate::signal::Signal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest derived state of one timeframe, read by the trader between passes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeState {
    pub timeframe: Timeframe,
    /// Start of the last closed candle the state was computed from.
    pub candle_time: Option<DateTime<Utc>>,
    pub last_close: f64,
    pub prev_close: f64,
    pub can_long: bool,
    pub can_short: bool,
    pub atr: Option<f64>,
    pub atr_multiplier: f64,
    /// Ladder for the current period, built from the last closed candle.
    pub pivot: Option<PivotLadder>,
}

impl TimeframeState {
    /// Empty state before warmup: no trend in either direction.
    pub fn empty(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candle_time: None,
            last_close: 0.0,
            prev_close: 0.0,
            can_long: false,
            can_short: false,
            atr: None,
            atr_multiplier: 0.0,
            pivot: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.candle_time.is_some()
    }

    /// Volatility stop: last close offset by `atr * multiplier` on the adverse side.
    pub fn stop_loss(&self, direction: Direction) -> Option<f64> {
        let atr = self.atr?;
        let stop = self.last_close - direction.sign() * atr * self.atr_multiplier;
        (stop > 0.0 && stop.is_finite()).then_some(stop)
    }

    /// Whether the trend does not contradict `direction`.
    pub fn allows(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.can_long,
            Direction::Short => self.can_short,
        }
    }
}

/// Output of one analyzer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub state: TimeframeState,
    pub entries: Vec<Signal>,
    pub exits: Vec<Signal>,
}

/// Trait for timeframe analyzers.
pub trait TimeframeAnalyzer: Send + Sync {
    /// Human-readable name (e.g., "momentum_crossover").
    fn name(&self) -> &str;

    fn timeframe(&self) -> Timeframe;

    /// Closed candles kept in history.
    fn depth(&self) -> usize;

    /// Closed candles needed before any signal is produced.
    fn warmup(&self) -> usize;

    /// Analyze the closed candles of this timeframe, oldest first.
    fn analyze(&self, candles: &[Candle], timestamp: DateTime<Utc>) -> Analysis;
}

/// State fields shared by every analyzer: closes, ATR stop inputs and pivot ladder.
pub(crate) fn base_state(timeframe: Timeframe, candles: &[Candle], atr: &Atr, atr_multiplier: f64) -> TimeframeState {
    let mut state = TimeframeState::empty(timeframe);
    let Some(last) = candles.last() else {
        return state;
    };
    state.candle_time = Some(last.timestamp);
    state.last_close = last.close;
    state.prev_close = candles.len().checked_sub(2).map_or(last.close, |i| candles[i].close);
    state.atr = atr.last(candles);
    state.atr_multiplier = atr_multiplier;
    state.pivot = PivotPoints::ladder(candles);
    state
}

/// True when `a` crossed above `b` between the previous and current values.
pub(crate) fn crossed_above(a_prev: f64, a_cur: f64, b_prev: f64, b_cur: f64) -> bool {
    a_prev <= b_prev && a_cur > b_cur
}

/// Last two finite values of a series.
pub(crate) fn last_two(series: &[f64]) -> Option<(f64, f64)> {
    match series {
        [.., prev, cur] if prev.is_finite() && cur.is_finite() => Some((*prev, *cur)),
        _ => None,
    }
}
