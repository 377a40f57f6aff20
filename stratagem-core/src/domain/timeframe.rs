//! Timeframes: candle widths expressed in whole seconds.
//!
//! The textual form is `t` for tick-level processing, otherwise a count and a
//! unit (`30s`, `3m`, `1h`, `1d`, `1w`).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(u32);

impl Timeframe {
    /// Tick-level processing, no candle aggregation.
    pub const TICK: Timeframe = Timeframe(0);
    pub const M1: Timeframe = Timeframe(60);
    pub const M3: Timeframe = Timeframe(180);
    pub const M5: Timeframe = Timeframe(300);
    pub const M15: Timeframe = Timeframe(900);
    pub const H1: Timeframe = Timeframe(3600);
    pub const H4: Timeframe = Timeframe(14_400);
    pub const D1: Timeframe = Timeframe(86_400);
    pub const W1: Timeframe = Timeframe(604_800);

    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub fn secs(self) -> u32 {
        self.0
    }

    pub fn is_tick(self) -> bool {
        self.0 == 0
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(i64::from(self.0))
    }

    /// Start of the bucket containing `ts`. Ticks map to themselves.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        if self.0 == 0 {
            return ts;
        }
        let width = i64::from(self.0);
        let secs = ts.timestamp().div_euclid(width) * width;
        Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("t");
        }
        for (unit, width) in [('w', 604_800), ('d', 86_400), ('h', 3600), ('m', 60)] {
            if self.0 % width == 0 {
                return write!(f, "{}{unit}", self.0 / width);
            }
        }
        write!(f, "{}s", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TimeframeError {
    #[error("empty timeframe")]
    Empty,

    #[error("invalid timeframe '{0}': expected t or <count><s|m|h|d|w>")]
    Invalid(String),
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimeframeError::Empty);
        }
        if s == "t" {
            return Ok(Timeframe::TICK);
        }
        let unit = s.chars().last().ok_or(TimeframeError::Empty)?;
        let count = &s[..s.len() - unit.len_utf8()];
        let width = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return Err(TimeframeError::Invalid(s.to_string())),
        };
        let count: u32 = count.parse().map_err(|_| TimeframeError::Invalid(s.to_string()))?;
        if count == 0 {
            return Err(TimeframeError::Invalid(s.to_string()));
        }
        count
            .checked_mul(width)
            .map(Timeframe)
            .ok_or_else(|| TimeframeError::Invalid(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
