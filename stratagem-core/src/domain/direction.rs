use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Whether `a` is strictly more favorable than `b` for a position in this direction.
    pub fn better(self, a: f64, b: f64) -> bool {
        (a - b) * self.sign() > 0.0
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("long"),
            Direction::Short => f.write_str("short"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_opposite() {
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }

    #[test]
    fn test_better() {
        assert!(Direction::Long.better(101.0, 100.0));
        assert!(!Direction::Long.better(99.0, 100.0));
        assert!(Direction::Short.better(99.0, 100.0));
    }
}
