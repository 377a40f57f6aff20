//! Entry screening and admission control.
//!
//! Both are pure functions over a snapshot of the trader state, so the
//! policies can be tested without a trader or an execution venue.

use crate::analysis::TimeframeState;
use crate::config::TraderParams;
use crate::domain::{Direction, Instrument, Timeframe, TradeMode};
use crate::signal::Signal;
use crate::trade::Trade;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Why an entry signal was dropped before admission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryRejection {
    TimeframeOutOfBand(Timeframe),
    Region,
    Trend,
    /// No reference target could be computed.
    NoTarget,
    /// Stop missing, at the entry price or on the wrong side.
    NoRisk,
    RewardRisk { ratio: f64 },
    MinGain { gain: f64 },
}

/// Why a screened entry was not turned into a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmissionRejection {
    MarketFiltered,
    Inactive,
    ShortOnSpot,
    Notional { notional: f64, min_notional: f64 },
    MaxTrades(usize),
    OppositeDirection,
    Pyramided,
    TooSoon,
}

/// Apply the entry policy to a candidate.
///
/// Returns the signal to act on: priced at the open execution price, with
/// the reference ladder target and a stop clamped to `max_loss`.
pub fn screen_entry(
    signal: &Signal,
    params: &TraderParams,
    instrument: &Instrument,
    states: &BTreeMap<Timeframe, TimeframeState>,
    region_allows: impl FnOnce(&Signal) -> bool,
) -> Result<Signal, EntryRejection> {
    if signal.timeframe < params.min_traded_timeframe || signal.timeframe > params.max_traded_timeframe {
        return Err(EntryRejection::TimeframeOutOfBand(signal.timeframe));
    }
    if !region_allows(signal) {
        return Err(EntryRejection::Region);
    }
    let direction = signal.direction;
    if !states.get(&params.trend_timeframe()).is_some_and(|s| s.allows(direction)) {
        return Err(EntryRejection::Trend);
    }

    let price = instrument.open_exec_price(direction);
    let mut stop_loss = signal.stop_loss;
    if let Some(atr_stop) = states.get(&params.sltp_timeframe).and_then(|s| s.stop_loss(direction)) {
        if direction.better(price, atr_stop) {
            stop_loss = Some(atr_stop);
        }
    }
    let take_profit = states
        .get(&params.ref_timeframe)
        .and_then(|s| s.pivot)
        .filter(|ladder| ladder.is_finite())
        .map(|ladder| ladder.target(direction, 3))
        .or(signal.take_profit)
        .ok_or(EntryRejection::NoTarget)?;

    let candidate = signal.clone().with_price(price).with_take_profit(take_profit).with_partial_tp(1.0);
    let candidate = match stop_loss {
        Some(sl) => candidate.with_stop_loss(sl),
        None => return Err(EntryRejection::NoRisk),
    };
    let loss = candidate.loss_rate().unwrap_or(0.0);
    let gain = candidate.gain_rate().unwrap_or(0.0);
    if !(loss > 0.0) {
        return Err(EntryRejection::NoRisk);
    }
    if gain / loss < params.min_reward_risk {
        return Err(EntryRejection::RewardRisk { ratio: gain / loss });
    }
    if gain < params.min_gain {
        return Err(EntryRejection::MinGain { gain });
    }
    if loss > params.max_loss {
        let clamped = price * (1.0 - direction.sign() * params.max_loss);
        return Ok(candidate.with_stop_loss(clamped));
    }
    Ok(candidate)
}

/// Trader state an admission decision reads.
#[derive(Debug, Clone, Copy)]
pub struct Admission<'a> {
    pub params: &'a TraderParams,
    pub instrument: &'a Instrument,
    pub trades: &'a [Trade],
    /// Market passed the acceptance filter.
    pub accepted: bool,
    /// Trader activity flag.
    pub active: bool,
    pub now: DateTime<Utc>,
}

/// Admission control for a screened entry of `quantity` at `signal.price`.
pub fn admit_entry(signal: &Signal, quantity: f64, ctx: &Admission<'_>) -> Result<(), AdmissionRejection> {
    let Admission { params, instrument, trades, accepted, active, now } = *ctx;
    if !accepted {
        return Err(AdmissionRejection::MarketFiltered);
    }
    if !active {
        return Err(AdmissionRejection::Inactive);
    }
    let direction = signal.direction;
    if direction == Direction::Short && instrument.trade_mode == TradeMode::Spot {
        return Err(AdmissionRejection::ShortOnSpot);
    }
    let notional = instrument.notional(quantity, signal.price);
    if quantity <= 0.0 || notional < instrument.min_notional {
        return Err(AdmissionRejection::Notional { notional, min_notional: instrument.min_notional });
    }

    let open: Vec<&Trade> = trades.iter().filter(|t| !t.is_terminal()).collect();
    if open.len() >= params.max_trades {
        return Err(AdmissionRejection::MaxTrades(params.max_trades));
    }
    if !params.hedging && open.iter().any(|t| t.direction != direction) {
        return Err(AdmissionRejection::OppositeDirection);
    }
    let same: Vec<&&Trade> = open.iter().filter(|t| t.direction == direction).collect();
    if same.len() > params.pyramided as usize {
        return Err(AdmissionRejection::Pyramided);
    }
    // Newest same-direction entry, whatever its timeframe.
    let delay = signal.timeframe.duration().max(params.trade_delay());
    let last_opened = same.iter().filter_map(|t| t.entry_open_time).max();
    if last_opened.is_some_and(|opened| now - opened < delay) {
        return Err(AdmissionRejection::TooSoon);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TradeId, TradeMode};
    use crate::indicators::PivotLadder;
    use chrono::{Duration, TimeZone};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()
    }

    fn instrument(ask: f64) -> Instrument {
        let mut inst = Instrument::new("BTCUSDT", TradeMode::Margin, 0.01, 0.0001);
        inst.bid = ask - 0.01;
        inst.ask = ask;
        inst.min_notional = 50.0;
        inst
    }

    /// Reference ladder with R3 at `r3` around a pivot of 100.
    fn states(r3: f64, atr: Option<f64>) -> BTreeMap<Timeframe, TimeframeState> {
        let mut reference = TimeframeState::empty(Timeframe::D1);
        reference.candle_time = Some(ts());
        reference.can_long = true;
        reference.can_short = true;
        let mut ladder = PivotLadder::from_hlc(110.0, 90.0, 100.0);
        ladder.resistances[2] = r3;
        reference.pivot = Some(ladder);

        let mut sltp = TimeframeState::empty(Timeframe::H1);
        sltp.last_close = 100.0;
        sltp.atr = atr;
        sltp.atr_multiplier = 1.0;
        BTreeMap::from([(Timeframe::D1, reference), (Timeframe::H1, sltp)])
    }

    fn ctx<'a>(params: &'a TraderParams, inst: &'a Instrument, trades: &'a [Trade], accepted: bool, active: bool, now: DateTime<Utc>) -> Admission<'a> {
        Admission { params, instrument: inst, trades, accepted, active, now }
    }

    fn long(stop: f64) -> Signal {
        Signal::entry(Direction::Long, Timeframe::M3, 100.0, ts()).with_stop_loss(stop)
    }

    #[test]
    fn poor_reward_risk_is_rejected() {
        let params = TraderParams::default();
        let err = screen_entry(&long(98.0), &params, &instrument(100.0), &states(101.0, None), |_| true).unwrap_err();
        assert!(matches!(err, EntryRejection::RewardRisk { ratio } if (ratio - 0.5).abs() < 1e-9));
    }

    #[test]
    fn zero_risk_is_rejected() {
        let params = TraderParams::default();
        let err = screen_entry(&long(100.0), &params, &instrument(100.0), &states(130.0, None), |_| true).unwrap_err();
        assert_eq!(err, EntryRejection::NoRisk);
    }

    #[test]
    fn small_gain_is_rejected() {
        let mut params = TraderParams::default();
        params.min_reward_risk = 0.1;
        let err = screen_entry(&long(99.0), &params, &instrument(100.0), &states(100.3, None), |_| true).unwrap_err();
        assert!(matches!(err, EntryRejection::MinGain { .. }));
    }

    #[test]
    fn wide_stop_is_clamped_not_rejected() {
        let params = TraderParams::default();
        let signal = screen_entry(&long(90.0), &params, &instrument(100.0), &states(130.0, None), |_| true).unwrap();
        assert_eq!(signal.take_profit, Some(130.0));
        assert!((signal.stop_loss.unwrap() - 96.5).abs() < 1e-9);
        assert_eq!(signal.partial_tp, 1.0);
    }

    #[test]
    fn atr_stop_replaces_signal_stop() {
        let params = TraderParams::default();
        let signal = screen_entry(&long(90.0), &params, &instrument(100.0), &states(130.0, Some(2.0)), |_| true).unwrap();
        assert_eq!(signal.stop_loss, Some(98.0));
    }

    #[test]
    fn band_region_and_trend_gates() {
        let params = TraderParams::default();
        let inst = instrument(100.0);
        let off_band = Signal::entry(Direction::Long, Timeframe::H1, 100.0, ts()).with_stop_loss(98.0);
        assert_eq!(
            screen_entry(&off_band, &params, &inst, &states(130.0, None), |_| true),
            Err(EntryRejection::TimeframeOutOfBand(Timeframe::H1))
        );
        assert_eq!(screen_entry(&long(98.0), &params, &inst, &states(130.0, None), |_| false), Err(EntryRejection::Region));

        let mut no_trend = states(130.0, None);
        if let Some(s) = no_trend.get_mut(&Timeframe::D1) {
            s.can_long = false;
        }
        assert_eq!(screen_entry(&long(98.0), &params, &inst, &no_trend, |_| true), Err(EntryRejection::Trend));
    }

    #[test]
    fn notional_below_minimum_is_rejected() {
        let params = TraderParams::default();
        let inst = instrument(100.0);
        let signal = long(98.0);
        let err = admit_entry(&signal, 0.0001, &ctx(&params, &inst, &[], true, true, ts())).unwrap_err();
        assert!(matches!(err, AdmissionRejection::Notional { min_notional, .. } if min_notional == 50.0));
        assert!(admit_entry(&signal, 1.0, &ctx(&params, &inst, &[], true, true, ts())).is_ok());
    }

    #[test]
    fn opposite_and_max_trades() {
        let mut params = TraderParams::default();
        params.max_trades = 2;
        let inst = instrument(100.0);
        let mut short = Trade::new(TradeId(1), &inst, Direction::Short, Timeframe::M3);
        short.state = crate::trade::TradeState::Active;
        let err = admit_entry(&long(98.0), 1.0, &ctx(&params, &inst, &[short.clone()], true, true, ts())).unwrap_err();
        assert_eq!(err, AdmissionRejection::OppositeDirection);

        params.max_trades = 1;
        let err = admit_entry(&long(98.0), 1.0, &ctx(&params, &inst, &[short], true, true, ts())).unwrap_err();
        assert_eq!(err, AdmissionRejection::MaxTrades(1));
    }

    #[test]
    fn recent_same_direction_entry_is_suppressed() {
        let mut params = TraderParams::default();
        params.max_trades = 3;
        params.pyramided = 2;
        let inst = instrument(100.0);
        let mut previous = Trade::new(TradeId(1), &inst, Direction::Long, Timeframe::M3);
        previous.state = crate::trade::TradeState::Active;
        previous.entry_open_time = Some(ts() - Duration::seconds(120));
        let trades = [previous];
        assert_eq!(
            admit_entry(&long(98.0), 1.0, &ctx(&params, &inst, &trades, true, true, ts())),
            Err(AdmissionRejection::TooSoon)
        );
        let later = ts() + Duration::seconds(61);
        assert!(admit_entry(&long(98.0), 1.0, &ctx(&params, &inst, &trades, true, true, later)).is_ok());
    }

    #[test]
    fn recent_entry_on_another_timeframe_is_suppressed() {
        let mut params = TraderParams::default();
        params.max_trades = 3;
        params.pyramided = 2;
        let inst = instrument(100.0);
        let mut previous = Trade::new(TradeId(1), &inst, Direction::Long, Timeframe::M3);
        previous.state = crate::trade::TradeState::Active;
        previous.entry_open_time = Some(ts() - Duration::seconds(10));
        let trades = [previous];

        let five_minutes = Signal::entry(Direction::Long, Timeframe::M5, 100.0, ts()).with_stop_loss(98.0);
        assert_eq!(
            admit_entry(&five_minutes, 1.0, &ctx(&params, &inst, &trades, true, true, ts())),
            Err(AdmissionRejection::TooSoon)
        );
        let later = ts() + Duration::seconds(290);
        assert!(admit_entry(&five_minutes, 1.0, &ctx(&params, &inst, &trades, true, true, later)).is_ok());
    }

    #[test]
    fn spot_markets_never_short() {
        let params = TraderParams::default();
        let mut inst = instrument(100.0);
        inst.trade_mode = TradeMode::Spot;
        let short = Signal::entry(Direction::Short, Timeframe::M3, 100.0, ts());
        assert_eq!(
            admit_entry(&short, 1.0, &ctx(&params, &inst, &[], true, true, ts())),
            Err(AdmissionRejection::ShortOnSpot)
        );
        assert_eq!(admit_entry(&long(98.0), 1.0, &ctx(&params, &inst, &[], true, false, ts())), Err(AdmissionRejection::Inactive));
    }
}
