//! Bounded candle history for one timeframe.

use crate::domain::{Candle, Tick, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Closed candles plus the candle currently being built.
///
/// At most `depth` closed candles are retained.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    timeframe: Timeframe,
    depth: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe, depth: usize) -> Self {
        Self { timeframe, depth: depth.max(1), candles: VecDeque::with_capacity(depth + 1) }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Fold a tick (at its mid price) into the current bucket.
    ///
    /// Returns true when the tick opened a new bucket, closing the previous
    /// candle. Ticks older than the current bucket are ignored.
    pub fn push_tick(&mut self, tick: &Tick) -> bool {
        if self.timeframe.is_tick() || !tick.is_sane() {
            return false;
        }
        let bucket = self.timeframe.bucket_start(tick.timestamp);
        let price = tick.mid();
        match self.candles.back_mut() {
            Some(current) if current.timestamp == bucket => {
                current.absorb(price, tick.volume);
                false
            }
            Some(current) if current.timestamp > bucket => false,
            _ => {
                let closed = self.close_current();
                self.candles.push_back(Candle::from_price(bucket, self.timeframe, price, tick.volume));
                self.trim();
                closed
            }
        }
    }

    /// Insert a candle from a feed. A candle for the current bucket replaces
    /// it, a newer one closes it. Older or foreign candles are ignored.
    pub fn push_candle(&mut self, candle: Candle) -> bool {
        if candle.timeframe != self.timeframe || !candle.is_sane() {
            return false;
        }
        let bucket = self.timeframe.bucket_start(candle.timestamp);
        match self.candles.back_mut() {
            Some(current) if current.timestamp == bucket => {
                *current = Candle { timestamp: bucket, ..candle };
                false
            }
            Some(current) if current.timestamp > bucket => false,
            _ => {
                let closed = self.close_current();
                self.candles.push_back(Candle { timestamp: bucket, ..candle });
                self.trim();
                closed
            }
        }
    }

    fn close_current(&mut self) -> bool {
        match self.candles.back_mut() {
            Some(current) if !current.ended => {
                current.ended = true;
                true
            }
            _ => false,
        }
    }

    fn trim(&mut self) {
        while self.closed_len() > self.depth {
            self.candles.pop_front();
        }
    }

    fn closed_len(&self) -> usize {
        self.candles.iter().filter(|c| c.ended).count()
    }

    /// Closed candles, oldest first.
    pub fn closed(&mut self) -> &[Candle] {
        let n = self.closed_len();
        &self.candles.make_contiguous()[..n]
    }

    /// The candle being built, if any.
    pub fn current(&self) -> Option<&Candle> {
        self.candles.back().filter(|c| !c.ended)
    }

    pub fn last_closed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.iter().rev().find(|c| c.ended).map(|c| c.timestamp)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn tick(secs: i64, price: f64) -> Tick {
        Tick::new(t0() + Duration::seconds(secs), price - 0.5, price + 0.5, 1.0)
    }

    #[test]
    fn ticks_aggregate_into_buckets() {
        let mut series = CandleSeries::new(Timeframe::M1, 10);
        assert!(!series.push_tick(&tick(0, 100.0)));
        assert!(!series.push_tick(&tick(30, 103.0)));
        assert!(!series.push_tick(&tick(59, 101.0)));
        assert!(series.closed().is_empty());

        assert!(series.push_tick(&tick(60, 102.0)));
        let closed = series.closed().to_vec();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].open, 100.0);
        assert_eq!(closed[0].high, 103.0);
        assert_eq!(closed[0].close, 101.0);
        assert_eq!(closed[0].volume, 3.0);
        assert_eq!(series.current().map(|c| c.open), Some(102.0));
        assert_eq!(series.last_closed_timestamp(), Some(t0()));
    }

    #[test]
    fn stale_ticks_are_ignored() {
        let mut series = CandleSeries::new(Timeframe::M1, 10);
        series.push_tick(&tick(120, 100.0));
        assert!(!series.push_tick(&tick(0, 50.0)));
        assert_eq!(series.len(), 1);
        assert_eq!(series.current().map(|c| c.low), Some(100.0));
    }

    #[test]
    fn depth_bounds_closed_history() {
        let mut series = CandleSeries::new(Timeframe::M1, 3);
        for i in 0..10 {
            series.push_tick(&tick(i * 60, 100.0 + i as f64));
        }
        assert_eq!(series.closed().len(), 3);
        assert_eq!(series.len(), 4);
        assert_eq!(series.closed()[2].close, 108.0);
    }

    #[test]
    fn tick_timeframe_builds_nothing() {
        let mut series = CandleSeries::new(Timeframe::TICK, 3);
        assert!(!series.push_tick(&tick(0, 100.0)));
        assert!(series.is_empty());
    }

    #[test]
    fn feed_candles_replace_then_close() {
        let mut series = CandleSeries::new(Timeframe::H1, 5);
        let mut c = Candle::from_price(t0(), Timeframe::H1, 100.0, 1.0);
        assert!(!series.push_candle(c.clone()));
        c.absorb(105.0, 1.0);
        assert!(!series.push_candle(c.clone()));
        assert_eq!(series.current().map(|c| c.high), Some(105.0));

        let next = Candle::from_price(t0() + Duration::hours(1), Timeframe::H1, 104.0, 1.0);
        assert!(series.push_candle(next));
        assert_eq!(series.closed().len(), 1);
        assert_eq!(series.closed()[0].high, 105.0);

        let foreign = Candle::from_price(t0(), Timeframe::M1, 1.0, 1.0);
        assert!(!series.push_candle(foreign));
    }
}
