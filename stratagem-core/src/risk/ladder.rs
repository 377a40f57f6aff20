//! Pivot ladder walk.
//!
//! The seven pivot levels are held in one table ordered from the most
//! profitable level down to the most adverse one (R3..S3 for longs, S3..R3
//! for shorts). Prices are multiplied by the direction sign so a single walk
//! serves both directions.

use crate::domain::Direction;
use crate::indicators::PivotLadder;

/// Tier labels matching the table order: +3 is the furthest profit level.
const TIERS: [i8; 7] = [3, 2, 1, 0, -1, -2, -3];

/// Where a price sits on the ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderPosition {
    /// Tier of the highest level the price has cleared (profit side positive).
    pub tier: i8,
    /// The cleared level.
    pub level: f64,
    /// Next level on the adverse side, the stop a trade should at least hold.
    pub guard: Option<f64>,
}

/// Which of the trade's protective orders the ladder asks to re-issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LadderUpdate {
    pub take_profit: bool,
    pub stop_loss: bool,
}

fn table(ladder: &PivotLadder, direction: Direction) -> [f64; 7] {
    let (profit, adverse) = match direction {
        Direction::Long => (ladder.resistances, ladder.supports),
        Direction::Short => (ladder.supports, ladder.resistances),
    };
    [profit[2], profit[1], profit[0], ladder.pivot, adverse[0], adverse[1], adverse[2]]
}

impl LadderPosition {
    /// Locate `price` on the ladder. `None` when it lies beyond the last adverse level.
    pub fn locate(ladder: &PivotLadder, direction: Direction, price: f64) -> Option<Self> {
        let sign = direction.sign();
        let levels = table(ladder, direction);
        let idx = levels.iter().position(|&level| price * sign > level * sign)?;
        Some(Self { tier: TIERS[idx], level: levels[idx], guard: levels.get(idx + 1).copied() })
    }
}

/// Evaluate the ladder for an open trade.
///
/// The target is refreshed when the reference close just crossed the cleared
/// level in the trade's favor. The stop is re-issued when it lags behind the
/// guard level (or is missing).
pub fn evaluate(
    ladder: &PivotLadder,
    direction: Direction,
    close_exec_price: f64,
    prev_close: f64,
    last_close: f64,
    stop_loss: Option<f64>,
) -> LadderUpdate {
    let Some(pos) = LadderPosition::locate(ladder, direction, close_exec_price) else {
        return LadderUpdate::default();
    };
    let sign = direction.sign();
    let crossed = prev_close * sign <= pos.level * sign && last_close * sign > pos.level * sign;
    let stop_lags = match (pos.guard, stop_loss) {
        (Some(_), None) => true,
        (Some(guard), Some(stop)) => stop * sign < guard * sign,
        (None, _) => false,
    };
    LadderUpdate { take_profit: crossed, stop_loss: stop_lags }
}

#[cfg(test)]
mod tests {
    use super::*;

    // P 100, R 110/120/130, S 90/80/70
    fn ladder() -> PivotLadder {
        PivotLadder::from_hlc(110.0, 90.0, 100.0)
    }

    #[test]
    fn locate_long() {
        let pos = LadderPosition::locate(&ladder(), Direction::Long, 115.0).unwrap();
        assert_eq!(pos.tier, 1);
        assert_eq!(pos.level, 110.0);
        assert_eq!(pos.guard, Some(100.0));

        let top = LadderPosition::locate(&ladder(), Direction::Long, 135.0).unwrap();
        assert_eq!(top.tier, 3);
        assert_eq!(top.guard, Some(120.0));

        let bottom = LadderPosition::locate(&ladder(), Direction::Long, 75.0).unwrap();
        assert_eq!(bottom.tier, -3);
        assert_eq!(bottom.guard, None);

        assert!(LadderPosition::locate(&ladder(), Direction::Long, 65.0).is_none());
    }

    #[test]
    fn locate_short_mirrors_long() {
        let pos = LadderPosition::locate(&ladder(), Direction::Short, 85.0).unwrap();
        assert_eq!(pos.tier, 1);
        assert_eq!(pos.level, 90.0);
        assert_eq!(pos.guard, Some(100.0));

        let adverse = LadderPosition::locate(&ladder(), Direction::Short, 125.0).unwrap();
        assert_eq!(adverse.tier, -3);
        assert_eq!(adverse.guard, None);
    }

    #[test]
    fn evaluate_crossing_refreshes_target() {
        let up = evaluate(&ladder(), Direction::Long, 111.0, 108.0, 111.0, Some(101.0));
        assert!(up.take_profit);
        assert!(!up.stop_loss);

        let no_cross = evaluate(&ladder(), Direction::Long, 112.0, 111.0, 112.0, Some(101.0));
        assert!(!no_cross.take_profit);
    }

    #[test]
    fn evaluate_lagging_stop() {
        let long = evaluate(&ladder(), Direction::Long, 115.0, 115.0, 115.0, Some(95.0));
        assert!(long.stop_loss);
        let short = evaluate(&ladder(), Direction::Short, 85.0, 85.0, 85.0, Some(105.0));
        assert!(short.stop_loss);
        let short_ok = evaluate(&ladder(), Direction::Short, 85.0, 85.0, 85.0, Some(99.0));
        assert!(!short_ok.stop_loss);
        let missing = evaluate(&ladder(), Direction::Short, 85.0, 85.0, 85.0, None);
        assert!(missing.stop_loss);
    }
}
