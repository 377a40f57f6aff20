//! Integration tests for the evaluation pass.
//!
//! Candles are fed the way a market feed would, then `process` runs the
//! whole pipeline: market filter, analyzers, exits, trade bookkeeping and
//! entries, against the paper venue.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use stratagem_core::analysis::{AnalyzerConfig, AnalyzerKind};
use stratagem_core::domain::{Candle, Direction, Instrument, Tick, Timeframe, TradeId, TradeMode};
use stratagem_core::execution::PaperExecution;
use stratagem_core::notify::{CollectingNotifier, NotificationLabel};
use stratagem_core::trade::{EntryOrderType, TradeEntry, TradeState};
use stratagem_core::{StrategyTrader, TraderParams};

// ─── Helpers ──────────────────────────────────────────────────────────

/// Seconds after the first candle, 2024-03-01 12:00 UTC.
fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Pass time of the candle scenarios: inside the fourth three-minute bucket.
const PASS: i64 = 550;

fn pivot_breakout(timeframe: Timeframe) -> AnalyzerConfig {
    AnalyzerConfig {
        timeframe,
        depth: 8,
        atr_period: 1,
        atr_multiplier: 0.5,
        kind: AnalyzerKind::PivotBreakout { sma_period: 2 },
    }
}

/// One three-minute analyzer driving trend, stops and targets.
fn m3_params() -> TraderParams {
    TraderParams {
        sltp_timeframe: Timeframe::M3,
        ref_timeframe: Timeframe::M3,
        order_type: EntryOrderType::Market,
        timeframes: vec![pivot_breakout(Timeframe::M3)],
        ..TraderParams::default()
    }
}

fn instrument(mode: TradeMode, vol24h_quote: f64) -> Instrument {
    let mut inst = Instrument::new("BTCUSDT", mode, 0.01, 0.001);
    inst.maker_fee = 0.0002;
    inst.taker_fee = 0.0005;
    inst.trade_quantity = 1.0;
    inst.vol24h_quote = vol24h_quote;
    inst
}

struct Harness {
    trader: StrategyTrader,
    venue: Arc<PaperExecution>,
    notifier: Arc<CollectingNotifier>,
}

impl Harness {
    fn new(params: TraderParams, instrument: Instrument) -> Self {
        let venue = Arc::new(PaperExecution::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let trader =
            StrategyTrader::new("breakout", "paper", params, instrument, venue.clone(), notifier.clone()).unwrap();
        Self { trader, venue, notifier }
    }

    fn liquid(params: TraderParams) -> Self {
        Self::new(params, instrument(TradeMode::Margin, 1e6))
    }

    fn quote(&self, secs: i64, bid: f64, ask: f64) {
        self.trader.on_tick(Tick::new(at(secs), bid, ask, 1.0));
    }

    fn candle(&self, timeframe: Timeframe, secs: i64, ohlc: [f64; 4]) {
        let [open, high, low, close] = ohlc;
        self.trader.on_candle(Candle {
            timestamp: at(secs),
            timeframe,
            open,
            high,
            low,
            close,
            volume: 10.0,
            ended: false,
        });
    }

    /// Four candles on `timeframe`: flat, a 99..101 range around 100, `third`,
    /// then a flat current candle at the third close.
    fn candles(&self, timeframe: Timeframe, third: [f64; 4]) {
        let step = timeframe.secs() as i64;
        self.candle(timeframe, 0, [100.0; 4]);
        self.candle(timeframe, step, [100.0, 101.0, 99.0, 100.0]);
        self.candle(timeframe, 2 * step, third);
        self.candle(timeframe, 3 * step, [third[3]; 4]);
    }

    /// Close through R1 of the 99..101 range: long entry, ATR stop 101, R3 108.67.
    fn breakout(&self) {
        self.candles(Timeframe::M3, [100.0, 104.0, 100.0, 103.0]);
        self.quote(PASS, 102.9, 103.0);
    }

    /// Close through S1 and the pivot: long exit plus short entry, ATR stop
    /// 98.75, S3 92.17.
    fn breakdown(&self, timeframe: Timeframe, quote_at: i64) {
        self.candles(timeframe, [100.0, 100.0, 96.5, 97.0]);
        self.quote(quote_at, 97.0, 97.1);
    }

    /// One-lot market trade on the current quote, added to the trader.
    fn open(&self, direction: Direction, timeframe: Timeframe, user_managed: bool) -> TradeId {
        let inst = self.trader.instrument();
        let mut trade = self.trader.new_trade(direction, timeframe);
        let entry = TradeEntry {
            order_type: EntryOrderType::Market,
            price: inst.open_exec_price(direction),
            quantity: 1.0,
            stop_loss: None,
            take_profit: None,
            partial_tp: 1.0,
            timestamp: at(0),
        };
        assert!(trade.open(self.venue.as_ref(), &inst, &entry));
        trade.user_managed = user_managed;
        let id = trade.id;
        assert!(self.trader.add_trade(trade));
        id
    }

    fn open_ids(&self) -> BTreeSet<TradeId> {
        self.trader.trades().iter().map(|t| t.id).collect()
    }

    fn labels(&self) -> Vec<NotificationLabel> {
        self.notifier.orders().iter().map(|n| n.label).collect()
    }
}

// ─── Pass gating ──────────────────────────────────────────────────────

#[test]
fn only_the_base_timeframe_runs_a_pass() {
    let h = Harness::liquid(m3_params());
    h.breakout();

    h.trader.process(Timeframe::M1, at(PASS));
    h.trader.process(Timeframe::M3, at(PASS));
    assert!(h.trader.trades().is_empty());
    assert_eq!(h.notifier.stream_count(), 0);
    assert!(h.venue.submitted().is_empty());

    h.trader.process(Timeframe::TICK, at(PASS));
    assert_eq!(h.notifier.stream_count(), 1);

    let trades = h.trader.trades();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.timeframe, Timeframe::M3);
    assert_eq!(trade.state, TradeState::Active);
    assert_eq!(trade.entry_price, 103.0);
    assert!((trade.stop_loss.unwrap() - 101.0).abs() < 0.011);
    assert!((trade.take_profit.unwrap() - 108.67).abs() < 0.011);

    let orders = h.notifier.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].label, NotificationLabel::Entry);
    assert_eq!(orders[0].trade_id, Some(trade.id));
}

#[test]
fn market_filter_is_cached_between_checks() {
    let h = Harness::new(m3_params(), instrument(TradeMode::Margin, 0.0));
    h.breakout();

    h.trader.process(Timeframe::TICK, at(PASS));
    assert!(h.trader.trades().is_empty(), "illiquid market runs no analyzer");

    h.trader.update_volume(10_000.0, 1e6);
    h.trader.process(Timeframe::TICK, at(PASS + 60));
    assert!(h.trader.trades().is_empty(), "filter outcome still cached");

    h.trader.process(Timeframe::TICK, at(PASS + 3600));
    assert_eq!(h.trader.trades().len(), 1);
    assert_eq!(h.notifier.stream_count(), 3);
}

#[test]
fn spot_market_is_not_streamed_when_margin_is_required() {
    let h = Harness::new(m3_params(), instrument(TradeMode::Spot, 1e6));
    h.breakout();

    h.trader.process(Timeframe::TICK, at(PASS));
    assert!(h.trader.trades().is_empty());
    assert_eq!(h.notifier.stream_count(), 0);
    assert!(h.notifier.orders().is_empty());
}

// ─── Exits ────────────────────────────────────────────────────────────

#[test]
fn exits_complete_before_entries_are_admitted() {
    let params = TraderParams { max_trades: 1, hedging: false, ..m3_params() };
    let h = Harness::liquid(params);
    h.breakdown(Timeframe::M3, PASS);
    let long = h.open(Direction::Long, Timeframe::M3, false);

    h.trader.process(Timeframe::TICK, at(PASS));

    let orders = h.notifier.orders();
    assert_eq!(h.labels(), vec![NotificationLabel::Exit, NotificationLabel::Entry]);
    assert_eq!(orders[0].trade_id, Some(long));
    assert_eq!(orders[0].direction, Direction::Long);

    let stats = h.trader.stats();
    assert_eq!(stats.trade_count(), 1);

    let trades = h.trader.trades();
    assert_eq!(trades.len(), 1);
    let short = &trades[0];
    assert_eq!(short.direction, Direction::Short);
    assert_eq!(orders[1].trade_id, Some(short.id));
    assert!((short.stop_loss.unwrap() - 98.75).abs() < 0.011);
    assert!((short.take_profit.unwrap() - 92.17).abs() < 0.011);
}

#[test]
fn exits_match_own_timeframe_then_reference() {
    let params = TraderParams {
        sltp_timeframe: Timeframe::H1,
        ref_timeframe: Timeframe::H1,
        order_type: EntryOrderType::Market,
        timeframes: vec![pivot_breakout(Timeframe::M3), pivot_breakout(Timeframe::H1)],
        ..TraderParams::default()
    };
    let h = Harness::liquid(params);
    h.breakdown(Timeframe::M3, PASS);
    let m3_long = h.open(Direction::Long, Timeframe::M3, false);
    let h1_long = h.open(Direction::Long, Timeframe::H1, false);
    let managed = h.open(Direction::Long, Timeframe::M3, true);
    let m3_short = h.open(Direction::Short, Timeframe::M3, false);
    let m1_long = h.open(Direction::Long, Timeframe::M1, false);

    // Three-minute long exit: only the three-minute long it belongs to closes.
    h.trader.process(Timeframe::TICK, at(PASS));
    assert_eq!(h.open_ids(), BTreeSet::from([h1_long, managed, m3_short, m1_long]));
    assert_eq!(h.trader.stats().trade_count(), 1);

    // Hourly long exit: the hourly long on its own timeframe, the one-minute
    // long through the reference timeframe, which has no analyzer of its own.
    let hour = Timeframe::H1.secs() as i64;
    h.breakdown(Timeframe::H1, 3 * hour + 10);
    h.trader.process(Timeframe::TICK, at(3 * hour + 10));
    assert_eq!(h.open_ids(), BTreeSet::from([managed, m3_short]));
    assert_eq!(h.trader.stats().trade_count(), 3);

    let closed: BTreeSet<TradeId> = h
        .notifier
        .orders()
        .iter()
        .filter(|n| n.label == NotificationLabel::Exit)
        .filter_map(|n| n.trade_id)
        .collect();
    assert_eq!(closed, BTreeSet::from([m3_long, h1_long, m1_long]));
    assert!(!closed.contains(&m3_short));
}

// ─── Entries ──────────────────────────────────────────────────────────

#[test]
fn inactive_trader_only_notifies_entries() {
    let h = Harness::liquid(m3_params());
    h.trader.set_activity(false);
    h.breakout();

    h.trader.process(Timeframe::TICK, at(PASS));

    assert!(h.trader.trades().is_empty());
    assert!(h.venue.submitted().is_empty());
    let orders = h.notifier.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].label, NotificationLabel::Entry);
    assert_eq!(orders[0].direction, Direction::Long);
    assert_eq!(orders[0].trade_id, None);
}
