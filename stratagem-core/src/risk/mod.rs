//! Stop and target management: tighten-only stops and the pivot ladder walk.

pub mod ladder;
pub mod ratchet;

pub use ladder::{evaluate as evaluate_ladder, LadderPosition, LadderUpdate};
pub use ratchet::RatchetState;
