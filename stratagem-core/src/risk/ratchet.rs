//! Ratchet invariant enforcement
//!
//! **Core Rule:** Stops may tighten, never loosen (even if ATR expands).

use crate::domain::Direction;

/// Ratchet state for a trade's stop-loss.
///
/// - Long trades: stop can only rise
/// - Short trades: stop can only fall
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    current_level: Option<f64>,
    direction: Direction,
}

impl RatchetState {
    /// Start from a trade's current stop, if it has one.
    pub fn new(direction: Direction, current_level: Option<f64>) -> Self {
        Self { current_level: current_level.filter(|v| *v > 0.0), direction }
    }

    /// Apply ratchet to a proposed stop level and return the resulting level.
    ///
    /// Non-positive or non-finite proposals are ignored.
    ///
    /// # Example
    /// ```
    /// use stratagem_core::domain::Direction;
    /// use stratagem_core::risk::RatchetState;
    ///
    /// let mut ratchet = RatchetState::new(Direction::Long, Some(95.0));
    /// assert_eq!(ratchet.apply(100.0), Some(100.0));
    /// assert_eq!(ratchet.apply(90.0), Some(100.0));
    /// ```
    pub fn apply(&mut self, proposed: f64) -> Option<f64> {
        if !proposed.is_finite() || proposed <= 0.0 {
            return self.current_level;
        }
        let level = match (self.current_level, self.direction) {
            (None, _) => proposed,
            (Some(current), Direction::Long) => current.max(proposed),
            (Some(current), Direction::Short) => current.min(proposed),
        };
        self.current_level = Some(level);
        self.current_level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    /// Whether `proposed` would tighten the current level.
    pub fn tightens(&self, proposed: f64) -> bool {
        match self.current_level {
            None => proposed > 0.0,
            Some(current) => self.direction.better(proposed, current),
        }
    }
}
