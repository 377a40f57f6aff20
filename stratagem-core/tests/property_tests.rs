//! Property tests for trade invariants.
//!
//! Uses proptest to verify:
//! 1. Quantity bounds: exits never exceed entries, entries never exceed the order
//! 2. Stop monotonicity: trailing stops only tighten along any price path
//! 3. Ratchet monotonicity: the ratchet itself never loosens

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use stratagem_core::domain::{Direction, Instrument, Timeframe, TradeId, TradeMode};
use stratagem_core::events::{OrderEvent, OrderFill};
use stratagem_core::execution::PaperExecution;
use stratagem_core::risk::RatchetState;
use stratagem_core::trade::{EntryOrderType, OrderLeg, Trade, TradeEntry, TradeOperation};

// ── Fixtures ─────────────────────────────────────────────────────────

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
}

fn instrument(bid: f64, ask: f64) -> Instrument {
    let mut inst = Instrument::new("BTCUSDT", TradeMode::Margin, 0.01, 0.001);
    inst.bid = bid;
    inst.ask = ask;
    inst.taker_fee = 0.0005;
    inst
}

fn fill_on(leg: &OrderLeg, quantity: f64, price: f64, secs: i64) -> OrderEvent {
    OrderEvent::Traded(OrderFill {
        market_id: "BTCUSDT".into(),
        order_id: leg.order_id.clone().unwrap(),
        ref_id: Some(leg.ref_id.clone()),
        timestamp: ts(secs),
        quantity,
        cumulative: None,
        exec_price: price,
        avg_price: None,
        maker: true,
        fully_filled: false,
    })
}

// ── Strategies (proptest) ────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Action {
    EntryFill(f64),
    PlaceStop(f64),
    StopFill(f64),
    Close,
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (0.01..1.5_f64).prop_map(Action::EntryFill),
        2 => (80.0..99.0_f64).prop_map(Action::PlaceStop),
        3 => (0.01..1.5_f64).prop_map(Action::StopFill),
        1 => Just(Action::Close),
    ]
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn arb_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(50.0..150.0_f64, 1..60)
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn quantities_stay_within_bounds(actions in prop::collection::vec(arb_action(), 1..40)) {
        let venue = PaperExecution::new();
        let inst = instrument(99.9, 100.0);
        let mut trade = Trade::new(TradeId(1), &inst, Direction::Long, Timeframe::M3);
        let entry = TradeEntry {
            order_type: EntryOrderType::Limit,
            price: 99.0,
            quantity: 1.0,
            stop_loss: None,
            take_profit: None,
            partial_tp: 1.0,
            timestamp: ts(0),
        };
        prop_assert!(trade.open(&venue, &inst, &entry));

        for (step, action) in actions.into_iter().enumerate() {
            let secs = (step as i64 + 1) * 61;
            match action {
                Action::EntryFill(qty) => {
                    if let Some(leg) = trade.entry.clone().filter(|leg| leg.resident) {
                        trade.order_signal(&fill_on(&leg, qty, 99.0, secs));
                    }
                }
                Action::PlaceStop(price) => {
                    let _ = trade.modify_stop_loss(&venue, &inst, price, ts(secs), Duration::seconds(60));
                }
                Action::StopFill(qty) => {
                    if let Some(leg) = trade.stop_order.clone() {
                        trade.order_signal(&fill_on(&leg, qty, leg.price.unwrap_or(95.0), secs));
                    }
                }
                Action::Close => {
                    trade.close(&venue, &inst);
                }
            }

            prop_assert!(trade.exec_entry_qty >= 0.0);
            prop_assert!(trade.exec_entry_qty <= trade.order_quantity + 1e-9);
            prop_assert!(trade.exec_exit_qty <= trade.exec_entry_qty + 1e-9);
            prop_assert!(trade.open_quantity() >= 0.0);
        }
    }

    #[test]
    fn trailing_stop_only_tightens(direction in arb_direction(), path in arb_path()) {
        let venue = PaperExecution::new();
        let inst = instrument(99.9, 100.0);
        let mut trade = Trade::new(TradeId(1), &inst, direction, Timeframe::M3);
        let entry = TradeEntry {
            order_type: EntryOrderType::Market,
            price: inst.open_exec_price(direction),
            quantity: 1.0,
            stop_loss: None,
            take_profit: None,
            partial_tp: 1.0,
            timestamp: ts(0),
        };
        prop_assert!(trade.open(&venue, &inst, &entry));
        let added = trade.add_operation(TradeOperation::TrailingStop { distance_rate: 0.03 });
        prop_assert!(added);

        let mut previous: Option<f64> = None;
        for (step, price) in path.into_iter().enumerate() {
            let quote = instrument(price, price + 0.01);
            trade.run_operations(&venue, &quote, ts((step as i64 + 1) * 30), Duration::seconds(60));

            let current = trade.stop_loss;
            prop_assert!(current.is_some());
            if let (Some(before), Some(now)) = (previous, current) {
                match direction {
                    Direction::Long => {
                        prop_assert!(now >= before, "long stop loosened {} -> {}", before, now);
                    }
                    Direction::Short => {
                        prop_assert!(now <= before, "short stop loosened {} -> {}", before, now);
                    }
                }
            }
            previous = current;
        }
    }

    #[test]
    fn ratchet_never_loosens(
        direction in arb_direction(),
        initial in prop::option::of(50.0..150.0_f64),
        proposals in prop::collection::vec(-10.0..200.0_f64, 1..50),
    ) {
        let mut ratchet = RatchetState::new(direction, initial);
        let mut level = ratchet.current_level();
        for proposed in proposals {
            let next = ratchet.apply(proposed);
            if let (Some(before), Some(after)) = (level, next) {
                match direction {
                    Direction::Long => {
                        prop_assert!(after >= before);
                    }
                    Direction::Short => {
                        prop_assert!(after <= before);
                    }
                }
            }
            prop_assert!(next.is_none() || next.is_some_and(|v| v > 0.0));
            level = next;
        }
    }
}
