//! Strategy trader: one per (strategy, instrument).
//!
//! Owns the trades and regions of its instrument, arbitrates analyzer
//! signals into trade openings and closures, keeps the running statistics
//! and persists its state. All mutable state sits behind one mutex; every
//! public entry point locks it once and hands `&mut TraderState` to the
//! internal steps.

pub mod screening;
pub mod stats;

mod state;

pub use screening::{admit_entry, screen_entry, Admission, AdmissionRejection, EntryRejection};
pub use stats::{ClosedTradeRecord, TraderStats};

use crate::analysis::TimeframeState;
use crate::config::{ConfigError, TraderParams};
use crate::domain::{Candle, Direction, Instrument, RegionId, Tick, Timeframe, TradeId};
use crate::events::{ExchangeEvent, OrderEvent, PositionEvent};
use crate::execution::TradingExecution;
use crate::notify::{NotificationLabel, Notifier, OrderNotification, StreamUpdate};
use crate::persistence::{StoreError, TradeStore, TraderKey};
use crate::region::{Region, RegionError};
use crate::risk::{evaluate_ladder, RatchetState};
use crate::signal::Signal;
use crate::trade::{Trade, TradeEntry, TradeOperation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use state::{MarketFilter, TraderState};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Counters persisted alongside the trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraderDocument {
    next_trade_id: u64,
    next_region_id: u64,
    activity: bool,
    stats: TraderStats,
}

pub struct StrategyTrader {
    strategy_id: String,
    account: String,
    params: TraderParams,
    execution: Arc<dyn TradingExecution>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<TraderState>,
}

impl StrategyTrader {
    pub fn new(
        strategy_id: impl Into<String>,
        account: impl Into<String>,
        params: TraderParams,
        instrument: Instrument,
        execution: Arc<dyn TradingExecution>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let state = TraderState::new(&params, instrument)?;
        Ok(Self {
            strategy_id: strategy_id.into(),
            account: account.into(),
            params,
            execution,
            notifier,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TraderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exec(&self) -> &dyn TradingExecution {
        self.execution.as_ref()
    }

    pub fn params(&self) -> &TraderParams {
        &self.params
    }

    pub fn key(&self) -> TraderKey {
        TraderKey::new(self.account.clone(), self.lock().instrument.market_id.clone(), self.strategy_id.clone())
    }

    // ─── Market data ─────────────────────────────────────────────────

    /// Apply a quote. Candles are built from it on the next pass.
    pub fn on_tick(&self, tick: Tick) {
        if !tick.is_sane() {
            debug!(strategy = %self.strategy_id, "ignoring insane tick");
            return;
        }
        let mut st = self.lock();
        st.instrument.update_tick(&tick);
        st.buffer_tick(tick);
    }

    /// Apply a candle update from a feed for one of the configured timeframes.
    pub fn on_candle(&self, candle: Candle) -> bool {
        let mut st = self.lock();
        match st.slots.get_mut(&candle.timeframe) {
            Some(slot) => slot.series.push_candle(candle),
            None => false,
        }
    }

    pub fn update_volume(&self, vol24h_base: f64, vol24h_quote: f64) {
        self.lock().instrument.update_volume(vol24h_base, vol24h_quote);
    }

    // ─── Evaluation pass ─────────────────────────────────────────────

    /// One evaluation pass. Does nothing unless `timeframe` is the base timeframe.
    pub fn process(&self, timeframe: Timeframe, timestamp: DateTime<Utc>) {
        if timeframe != self.params.base_timeframe {
            return;
        }
        let mut guard = self.lock();
        let st = &mut *guard;

        st.fold_ticks();

        let filter = self.filter_market(st, timestamp);
        if !filter.accept {
            self.update_trades_locked(st, timestamp);
            return;
        }

        let (entries, exits) = if filter.compute { st.run_analyzers(timestamp) } else { (Vec::new(), Vec::new()) };
        let states = st.states();

        let (bid, ask) = (st.instrument.bid, st.instrument.ask);
        let mut retained = Vec::new();
        for signal in &entries {
            let regions = &mut st.regions;
            let region_allows = |s: &Signal| check_regions_in(regions, timestamp, bid, ask, s, self.params.region_allow);
            match screen_entry(signal, &self.params, &st.instrument, &states, region_allows) {
                Ok(screened) => retained.push(screened),
                Err(reason) => {
                    debug!(market_id = %st.instrument.market_id, timeframe = %signal.timeframe, ?reason, "entry screened out")
                }
            }
        }

        self.process_exits(st, &exits, &states, timestamp);
        self.update_trades_locked(st, timestamp);

        for signal in retained {
            self.process_entry(st, &signal, filter.accept, timestamp);
        }

        self.notifier.stream(&StreamUpdate {
            market_id: st.instrument.market_id.clone(),
            timestamp,
            bid: st.instrument.bid,
            ask: st.instrument.ask,
            open_trades: st.open_trades(),
            timeframes: states.into_values().collect(),
        });
    }

    /// Market acceptance, recomputed at most once per cache interval.
    fn filter_market(&self, st: &mut TraderState, timestamp: DateTime<Utc>) -> MarketFilter {
        if let Some(filter) = st.filter {
            if timestamp - filter.checked_at < self.params.filter_cache_interval() {
                return filter;
            }
        }
        let inst = &st.instrument;
        let (accept, compute) = if self.params.margin_only && !inst.is_margin() {
            (false, false)
        } else if inst.vol24h_quote < self.params.min_vol24h || inst.market_price() < self.params.min_price {
            (true, false)
        } else {
            (true, true)
        };
        if !compute {
            info!(market_id = %inst.market_id, accept, "market filtered");
        }
        let filter = MarketFilter { checked_at: timestamp, accept, compute };
        st.filter = Some(filter);
        filter
    }

    /// Exit signals and stop/target trailing for every open trade.
    fn process_exits(
        &self,
        st: &mut TraderState,
        exits: &[Signal],
        states: &BTreeMap<Timeframe, TimeframeState>,
        timestamp: DateTime<Utc>,
    ) {
        let ref_tf = self.params.ref_timeframe;
        for idx in 0..st.trades.len() {
            let exit = {
                let trade = &st.trades[idx];
                if trade.user_managed || !trade.is_active() {
                    continue;
                }
                let matching =
                    |tf: Timeframe| exits.iter().find(|s| s.timeframe == tf && s.direction == trade.direction);
                matching(trade.timeframe).or_else(|| matching(ref_tf)).cloned()
            };
            if let Some(exit) = exit {
                self.process_exit(st, idx, &exit, timestamp);
            }
        }

        let TraderState { trades, instrument, .. } = st;
        for trade in trades.iter_mut().filter(|t| t.is_active()) {
            self.trail_stops(trade, instrument, states, timestamp);
        }
    }

    fn process_exit(&self, st: &mut TraderState, idx: usize, signal: &Signal, timestamp: DateTime<Utc>) {
        let TraderState { trades, instrument, activity, .. } = st;
        let trade = &mut trades[idx];
        let price = instrument.close_exec_price(trade.direction);
        let rate = trade.fee_adjusted_rate(trade.profit_rate_at(price), instrument);

        let trade_id = if *activity {
            if !trade.close(self.exec(), instrument) {
                return;
            }
            info!(market_id = %instrument.market_id, trade_id = %trade.id, timeframe = %signal.timeframe, "exit signal");
            Some(trade.id)
        } else {
            None
        };
        self.notify(
            instrument,
            trade_id,
            trade.direction,
            signal.timeframe,
            NotificationLabel::Exit,
            price,
            timestamp,
            Some(rate),
            trade.stop_loss,
            trade.take_profit,
        );
    }

    /// Recompute stop-loss and take-profit from the ATR stop and the reference pivot ladder.
    fn trail_stops(
        &self,
        trade: &mut Trade,
        instrument: &Instrument,
        states: &BTreeMap<Timeframe, TimeframeState>,
        timestamp: DateTime<Utc>,
    ) {
        let direction = trade.direction;
        let close_price = instrument.close_exec_price(direction);
        if !(close_price > 0.0) {
            return;
        }
        // Prices of the orders resting on the venue. A local price that differs
        // (rejected or throttled modification) is re-issued on a later pass.
        let resident_stop = trade.stop_order.as_ref().filter(|l| l.resident).and_then(|l| l.price);
        let resident_target = trade.limit_order.as_ref().filter(|l| l.resident).and_then(|l| l.price);
        let mut update_tp = resident_target.is_none() || resident_target != trade.take_profit;
        let mut update_sl = resident_stop.is_none() || resident_stop != trade.stop_loss;

        let mut stop = trade.stop_loss;
        let atr_stop = states.get(&self.params.sltp_timeframe).and_then(|s| s.stop_loss(direction));
        if let Some(atr_stop) = atr_stop.filter(|s| direction.better(close_price, *s)) {
            stop = RatchetState::new(direction, stop).apply(atr_stop);
        }

        let mut target = None;
        if let Some(reference) = states.get(&self.params.ref_timeframe) {
            if let Some(ladder) = reference.pivot.filter(|l| l.is_finite()) {
                let update =
                    evaluate_ladder(&ladder, direction, close_price, reference.prev_close, reference.last_close, stop);
                update_tp |= update.take_profit;
                update_sl |= update.stop_loss;
                target = Some(ladder.target(direction, trade.target_tier()));
            }
        }

        let interval = self.params.sltp_min_interval();
        if update_sl {
            if let Some(stop) = stop.filter(|s| *s > 0.0).map(|s| instrument.adjust_price(s)) {
                if resident_stop != Some(stop) {
                    if let Err(err) = trade.modify_stop_loss(self.exec(), instrument, stop, timestamp, interval) {
                        warn!(trade_id = %trade.id, error = %err, "stop-loss modification failed");
                    }
                }
            }
        }
        if update_tp {
            if let Some(target) = target.filter(|t| *t > 0.0).map(|t| instrument.adjust_price(t)) {
                if resident_target != Some(target) {
                    if let Err(err) = trade.modify_take_profit(self.exec(), instrument, target, timestamp, interval) {
                        warn!(trade_id = %trade.id, error = %err, "take-profit modification failed");
                    }
                }
            }
        }
    }

    fn process_entry(&self, st: &mut TraderState, signal: &Signal, accepted: bool, timestamp: DateTime<Utc>) {
        let quantity = st.instrument.adjust_quantity(st.instrument.trade_quantity);
        let ctx = Admission {
            params: &self.params,
            instrument: &st.instrument,
            trades: &st.trades,
            accepted,
            active: st.activity,
            now: timestamp,
        };
        if let Err(reason) = admit_entry(signal, quantity, &ctx) {
            debug!(market_id = %st.instrument.market_id, ?reason, "entry not admitted");
            self.notify_signal(&st.instrument, None, signal, NotificationLabel::Entry);
            return;
        }

        let id = st.allocate_trade_id();
        let mut trade = Trade::new(id, &st.instrument, signal.direction, signal.timeframe);
        let entry = TradeEntry {
            order_type: self.params.order_type,
            price: signal.price,
            quantity,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            partial_tp: signal.partial_tp,
            timestamp,
        };
        if !trade.open(self.exec(), &st.instrument, &entry) {
            return;
        }
        info!(market_id = %st.instrument.market_id, trade_id = %id, direction = %signal.direction, timeframe = %signal.timeframe, "trade opened");
        self.notify_signal(&st.instrument, Some(id), signal, NotificationLabel::Entry);
        st.trades.push(trade);
    }

    // ─── Trade bookkeeping ───────────────────────────────────────────

    /// Run operations, fire stop-loss/take-profit, time out entries and
    /// delete finished trades into the statistics.
    pub fn update_trades(&self, timestamp: DateTime<Utc>) {
        let mut guard = self.lock();
        self.update_trades_locked(&mut guard, timestamp);
    }

    fn update_trades_locked(&self, st: &mut TraderState, timestamp: DateTime<Utc>) {
        let interval = self.params.sltp_min_interval();
        let TraderState { trades, instrument, stats, deleted, .. } = st;

        for trade in trades.iter_mut() {
            if trade.is_active() {
                trade.run_operations(self.exec(), instrument, timestamp, interval);
                trade.update_stats(instrument.close_exec_price(trade.direction), timestamp);
            }
            if trade.is_entry_timeout(timestamp, self.params.entry_timeout(trade.timeframe)) {
                debug!(trade_id = %trade.id, "entry timeout");
                trade.cancel_open(self.exec());
            }
            if trade.is_active() && instrument.tradeable {
                self.check_stop_and_target(trade, instrument, timestamp);
            }
        }

        let mut kept = Vec::with_capacity(trades.len());
        for mut trade in trades.drain(..) {
            if !trade.can_delete() {
                kept.push(trade);
                continue;
            }
            trade.remove(self.exec());
            if let Some(rate) = stats.record(&trade, instrument) {
                info!(market_id = %instrument.market_id, trade_id = %trade.id, rate, "trade recorded");
            }
            deleted.push(trade.id);
        }
        *trades = kept;
    }

    fn check_stop_and_target(&self, trade: &mut Trade, instrument: &Instrument, timestamp: DateTime<Utc>) {
        let direction = trade.direction;
        let price = instrument.close_exec_price(direction);
        if !(price > 0.0) {
            return;
        }
        let label = if trade.take_profit.is_some_and(|tp| !direction.better(tp, price)) && !trade.has_limit_order() {
            NotificationLabel::TakeProfit
        } else if trade.stop_loss.is_some_and(|sl| !direction.better(price, sl)) && !trade.has_stop_order() {
            NotificationLabel::StopLoss
        } else {
            return;
        };
        let rate = trade.fee_adjusted_rate(trade.profit_rate_at(price), instrument);
        if trade.close(self.exec(), instrument) {
            info!(market_id = %instrument.market_id, trade_id = %trade.id, label = label.as_str(), "protective close");
            self.notify(
                instrument,
                Some(trade.id),
                direction,
                trade.timeframe,
                label,
                price,
                timestamp,
                Some(rate),
                trade.stop_loss,
                trade.take_profit,
            );
        }
    }

    /// Insert an externally built trade. Returns `false` when its id is taken.
    pub fn add_trade(&self, trade: Trade) -> bool {
        let mut st = self.lock();
        if st.trades.iter().any(|t| t.id == trade.id) {
            return false;
        }
        st.next_trade_id = st.next_trade_id.max(trade.id.0 + 1);
        st.trades.push(trade);
        true
    }

    /// New trade with a fresh id, not yet added.
    pub fn new_trade(&self, direction: Direction, timeframe: Timeframe) -> Trade {
        let mut st = self.lock();
        let id = st.allocate_trade_id();
        Trade::new(id, &st.instrument, direction, timeframe)
    }

    /// Remove a trade, canceling its resident orders.
    pub fn remove_trade(&self, id: TradeId) -> Option<Trade> {
        let mut st = self.lock();
        let idx = st.trades.iter().position(|t| t.id == id)?;
        let mut trade = st.trades.remove(idx);
        trade.remove(self.exec());
        st.deleted.push(id);
        Some(trade)
    }

    pub fn add_operation(&self, id: TradeId, operation: TradeOperation) -> bool {
        let mut st = self.lock();
        st.trades.iter_mut().find(|t| t.id == id).is_some_and(|t| t.add_operation(operation))
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.lock().trades.clone()
    }

    pub fn stats(&self) -> TraderStats {
        self.lock().stats.clone()
    }

    pub fn instrument(&self) -> Instrument {
        self.lock().instrument.clone()
    }

    pub fn timeframe_states(&self) -> Vec<TimeframeState> {
        self.lock().states().into_values().collect()
    }

    pub fn set_activity(&self, active: bool) {
        self.lock().activity = active;
    }

    pub fn activity(&self) -> bool {
        self.lock().activity
    }

    // ─── Exchange events ─────────────────────────────────────────────

    pub fn order_signal(&self, event: &OrderEvent) -> bool {
        let mut st = self.lock();
        if event.market_id() != st.instrument.market_id {
            return false;
        }
        let Some(trade) = st.trades.iter_mut().find(|trade| trade.is_target_order(event.order_id(), event.ref_id())) else {
            debug!(market_id = %event.market_id(), order_id = %event.order_id(), "order event for no trade");
            return false;
        };
        trade.order_signal(event);
        if trade.settle_exit(self.exec()) {
            debug!(trade_id = %trade.id, "entry remainder canceled after exit");
        }
        true
    }

    pub fn position_signal(&self, event: &PositionEvent) -> bool {
        let mut st = self.lock();
        if event.update().market_id != st.instrument.market_id {
            return false;
        }
        st.trades.iter_mut().any(|trade| trade.position_signal(event))
    }

    pub fn on_exchange_event(&self, event: &ExchangeEvent) -> bool {
        match event {
            ExchangeEvent::Order(e) => self.order_signal(e),
            ExchangeEvent::Position(e) => self.position_signal(e),
        }
    }

    // ─── Regions ─────────────────────────────────────────────────────

    /// Add a region under a fresh id.
    pub fn add_region(&self, mut region: Region) -> Result<RegionId, RegionError> {
        region.check()?;
        let mut st = self.lock();
        let id = RegionId(st.next_region_id);
        st.next_region_id += 1;
        region.id = id;
        st.regions.push(region);
        Ok(id)
    }

    pub fn remove_region(&self, id: RegionId) -> bool {
        let mut st = self.lock();
        let before = st.regions.len();
        st.regions.retain(|r| r.id != id);
        st.regions.len() != before
    }

    pub fn regions(&self) -> Vec<Region> {
        self.lock().regions.clone()
    }

    /// Drop regions that expired or whose cancellation price was reached.
    pub fn cleanup_regions(&self, timestamp: DateTime<Utc>, bid: f64, ask: f64) -> usize {
        let mut st = self.lock();
        let before = st.regions.len();
        st.regions.retain(|r| !r.can_delete(timestamp, bid, ask));
        before - st.regions.len()
    }

    /// Whether `signal` passes the regions: `allow` when none are defined,
    /// otherwise at least one live region must accept it.
    pub fn check_regions(&self, timestamp: DateTime<Utc>, bid: f64, ask: f64, signal: &Signal, allow: bool) -> bool {
        let mut st = self.lock();
        check_regions_in(&mut st.regions, timestamp, bid, ask, signal, allow)
    }

    // ─── Persistence ─────────────────────────────────────────────────

    /// Write every trade, the regions and the counters; drop documents of deleted trades.
    pub fn save(&self, store: &dyn TradeStore) -> Result<(), StoreError> {
        let key = self.key();
        let mut st = self.lock();
        for trade in &st.trades {
            store.store_trade(&key, trade.id, &serde_json::to_value(trade)?)?;
        }
        for id in std::mem::take(&mut st.deleted) {
            store.delete_trade(&key, id)?;
        }
        store.store_regions(&key, &serde_json::to_value(&st.regions)?)?;
        let document = TraderDocument {
            next_trade_id: st.next_trade_id,
            next_region_id: st.next_region_id,
            activity: st.activity,
            stats: st.stats.clone(),
        };
        store.store_trader(&key, &serde_json::to_value(document)?)
    }

    /// Restore from `store`. Terminal and malformed trades, invalid
    /// operations and invalid regions are skipped. Returns the number of
    /// trades restored.
    pub fn loads(&self, store: &dyn TradeStore) -> Result<usize, StoreError> {
        let key = self.key();
        let trader_doc = store.load_trader(&key)?;
        let trade_docs = store.load_trades(&key)?;
        let region_doc = store.load_regions(&key)?;

        let mut st = self.lock();
        if let Some(doc) = trader_doc {
            match serde_json::from_value::<TraderDocument>(doc) {
                Ok(doc) => {
                    st.next_trade_id = st.next_trade_id.max(doc.next_trade_id);
                    st.next_region_id = st.next_region_id.max(doc.next_region_id);
                    st.activity = doc.activity;
                    st.stats = doc.stats;
                }
                Err(err) => warn!(error = %err, "skipping malformed trader document"),
            }
        }

        let mut restored = 0;
        for doc in trade_docs {
            let Some(trade) = restore_trade(doc) else {
                continue;
            };
            if trade.is_terminal() {
                debug!(trade_id = %trade.id, state = ?trade.state, "not restoring terminal trade");
                continue;
            }
            if st.trades.iter().any(|t| t.id == trade.id) {
                warn!(trade_id = %trade.id, "duplicate trade id on restore");
                continue;
            }
            st.next_trade_id = st.next_trade_id.max(trade.id.0 + 1);
            st.trades.push(trade);
            restored += 1;
        }

        if let Some(Value::Array(regions)) = region_doc {
            for doc in regions {
                match serde_json::from_value::<Region>(doc) {
                    Ok(region) if region.check().is_ok() => {
                        st.next_region_id = st.next_region_id.max(region.id.0 + 1);
                        st.regions.push(region);
                    }
                    Ok(region) => warn!(region_id = %region.id, "skipping invalid region"),
                    Err(err) => warn!(error = %err, "skipping malformed region"),
                }
            }
        }
        info!(market_id = %key.market_id, restored, "trader restored");
        Ok(restored)
    }

    // ─── Notifications ───────────────────────────────────────────────

    fn notify_signal(&self, instrument: &Instrument, trade_id: Option<TradeId>, signal: &Signal, label: NotificationLabel) {
        self.notify(
            instrument,
            trade_id,
            signal.direction,
            signal.timeframe,
            label,
            signal.price,
            signal.timestamp,
            None,
            signal.stop_loss,
            signal.take_profit,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        instrument: &Instrument,
        trade_id: Option<TradeId>,
        direction: Direction,
        timeframe: Timeframe,
        label: NotificationLabel,
        price: f64,
        timestamp: DateTime<Utc>,
        profit_loss_rate: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) {
        self.notifier.notify_order(&OrderNotification {
            trade_id,
            direction,
            market_id: instrument.market_id.clone(),
            price: instrument.format_price(price),
            timestamp,
            timeframe,
            label,
            profit_loss_rate,
            stop_loss,
            take_profit,
        });
    }
}

fn check_regions_in(
    regions: &mut Vec<Region>,
    timestamp: DateTime<Utc>,
    bid: f64,
    ask: f64,
    signal: &Signal,
    allow: bool,
) -> bool {
    if regions.is_empty() {
        return allow;
    }
    regions.retain(|r| !r.can_delete(timestamp, bid, ask));
    regions.iter().any(|r| r.test_region(timestamp, signal))
}

/// Decode a stored trade, validating its operations one by one.
fn restore_trade(mut doc: Value) -> Option<Trade> {
    let operations = doc.as_object_mut().and_then(|obj| obj.remove("operations"));
    let mut trade = match serde_json::from_value::<Trade>(doc) {
        Ok(trade) => trade,
        Err(err) => {
            warn!(error = %err, "skipping malformed trade");
            return None;
        }
    };
    if let Some(Value::Array(ops)) = operations {
        for op in ops {
            match serde_json::from_value::<TradeOperation>(op) {
                Ok(op) if op.check(&trade) => trade.operations.push(op),
                Ok(op) => warn!(trade_id = %trade.id, ?op, "skipping invalid operation"),
                Err(err) => warn!(trade_id = %trade.id, error = %err, "skipping malformed operation"),
            }
        }
    }
    Some(trade)
}
