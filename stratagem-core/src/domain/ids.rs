use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade identifier, unique and monotonic within one strategy trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region identifier, unique and monotonic within one strategy trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-side order reference, chosen by the trade before submission.
///
/// The exchange echoes it back on order events, which lets a fill be matched
/// even when it arrives before the exchange order id is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefId(pub String);

impl RefId {
    /// Build a reference from the trade id, a leg tag and a per-trade counter.
    pub fn for_leg(trade: TradeId, leg: &str, seq: u32) -> Self {
        Self(format!("t{}-{leg}-{seq}", trade.0))
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exchange-assigned position identifier (margin markets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
