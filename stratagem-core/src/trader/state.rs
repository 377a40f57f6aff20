//! Mutable state of a strategy trader, guarded by its single lock.

use super::stats::TraderStats;
use crate::analysis::{build_analyzer, CandleSeries, TimeframeAnalyzer, TimeframeState};
use crate::config::{ConfigError, TraderParams};
use crate::domain::{Instrument, Tick, Timeframe, TradeId};
use crate::region::Region;
use crate::signal::Signal;
use crate::trade::Trade;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Ticks kept between two passes before they are folded anyway.
const MAX_PENDING_TICKS: usize = 4096;

/// One configured timeframe: its analyzer, candles and last derived state.
pub(crate) struct TimeframeSlot {
    pub analyzer: Box<dyn TimeframeAnalyzer>,
    pub series: CandleSeries,
    pub state: TimeframeState,
}

impl TimeframeSlot {
    /// Run the analyzer when a new candle closed since the last run.
    fn refresh(&mut self, timestamp: DateTime<Utc>) -> Option<(Vec<Signal>, Vec<Signal>)> {
        let closed = self.series.last_closed_timestamp()?;
        if self.state.candle_time == Some(closed) {
            return None;
        }
        let analysis = self.analyzer.analyze(self.series.closed(), timestamp);
        self.state = analysis.state;
        self.state.candle_time = Some(closed);
        Some((analysis.entries, analysis.exits))
    }
}

/// Cached outcome of the market acceptance filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MarketFilter {
    pub checked_at: DateTime<Utc>,
    /// Market may be traded at all.
    pub accept: bool,
    /// Market is liquid enough to run the analyzers.
    pub compute: bool,
}

pub(crate) struct TraderState {
    pub instrument: Instrument,
    pub slots: BTreeMap<Timeframe, TimeframeSlot>,
    pub pending_ticks: Vec<Tick>,
    pub trades: Vec<Trade>,
    pub regions: Vec<Region>,
    pub next_trade_id: u64,
    pub next_region_id: u64,
    pub stats: TraderStats,
    pub activity: bool,
    pub filter: Option<MarketFilter>,
    /// Deleted since the last save.
    pub deleted: Vec<TradeId>,
}

impl TraderState {
    pub fn new(params: &TraderParams, instrument: Instrument) -> Result<Self, ConfigError> {
        let mut slots = BTreeMap::new();
        for config in &params.timeframes {
            let analyzer = build_analyzer(config)?;
            let series = CandleSeries::new(config.timeframe, analyzer.depth());
            slots.insert(
                config.timeframe,
                TimeframeSlot { analyzer, series, state: TimeframeState::empty(config.timeframe) },
            );
        }
        Ok(Self {
            instrument,
            slots,
            pending_ticks: Vec::new(),
            trades: Vec::new(),
            regions: Vec::new(),
            next_trade_id: 1,
            next_region_id: 1,
            stats: TraderStats::default(),
            activity: true,
            filter: None,
            deleted: Vec::new(),
        })
    }

    pub fn buffer_tick(&mut self, tick: Tick) {
        self.pending_ticks.push(tick);
        if self.pending_ticks.len() >= MAX_PENDING_TICKS {
            self.fold_ticks();
        }
    }

    /// Aggregate buffered ticks into every timeframe's current candle.
    pub fn fold_ticks(&mut self) {
        for tick in std::mem::take(&mut self.pending_ticks) {
            for slot in self.slots.values_mut() {
                slot.series.push_tick(&tick);
            }
        }
    }

    /// Run analyzers whose timeframe closed a candle; returns (entries, exits).
    pub fn run_analyzers(&mut self, timestamp: DateTime<Utc>) -> (Vec<Signal>, Vec<Signal>) {
        let mut entries = Vec::new();
        let mut exits = Vec::new();
        for slot in self.slots.values_mut() {
            if let Some((e, x)) = slot.refresh(timestamp) {
                entries.extend(e);
                exits.extend(x);
            }
        }
        (entries, exits)
    }

    pub fn states(&self) -> BTreeMap<Timeframe, TimeframeState> {
        self.slots.iter().map(|(tf, slot)| (*tf, slot.state.clone())).collect()
    }

    pub fn allocate_trade_id(&mut self) -> TradeId {
        let id = TradeId(self.next_trade_id);
        self.next_trade_id += 1;
        id
    }

    pub fn open_trades(&self) -> usize {
        self.trades.iter().filter(|t| !t.is_terminal()).count()
    }
}
