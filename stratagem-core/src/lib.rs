//! Stratagem Core: multi-timeframe strategy trading engine.
//!
//! This crate contains the trade lifecycle manager:
//! - Domain types (timeframes, ticks, candles, instruments, identifiers)
//! - Indicators and per-timeframe analyzers producing entry/exit signals
//! - Regions gating which signals may be acted upon
//! - Trade state machine with stop-loss/take-profit management
//! - Strategy trader arbitrating signals into trades, with statistics
//! - Execution, notification and persistence seams

pub mod analysis;
pub mod config;
pub mod domain;
pub mod events;
pub mod execution;
pub mod indicators;
pub mod notify;
pub mod persistence;
pub mod region;
pub mod risk;
pub mod signal;
pub mod trade;
pub mod trader;

pub use config::{ConfigError, StratagemConfig, TraderParams};
pub use trader::StrategyTrader;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared across threads are Send + Sync.
    ///
    /// The CLI replays instruments on a rayon pool and exchange callbacks may
    /// arrive from another thread than the evaluation loop.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Instrument>();
        require_sync::<domain::Instrument>();
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Tick>();
        require_sync::<domain::Tick>();

        // Trading state
        require_send::<trade::Trade>();
        require_sync::<trade::Trade>();
        require_send::<region::Region>();
        require_sync::<region::Region>();
        require_send::<signal::Signal>();
        require_sync::<signal::Signal>();
        require_send::<events::ExchangeEvent>();
        require_sync::<events::ExchangeEvent>();

        // Shared services
        require_send::<StrategyTrader>();
        require_sync::<StrategyTrader>();
        require_send::<execution::PaperExecution>();
        require_sync::<execution::PaperExecution>();
        require_send::<notify::CollectingNotifier>();
        require_sync::<notify::CollectingNotifier>();
        require_send::<persistence::JsonFileStore>();
        require_sync::<persistence::JsonFileStore>();
        require_send::<persistence::MemoryStore>();
        require_sync::<persistence::MemoryStore>();
    }
}
