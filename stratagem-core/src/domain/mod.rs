//! Domain types: identifiers, direction, timeframes, market data, instruments.

pub mod candle;
pub mod direction;
pub mod ids;
pub mod instrument;
pub mod timeframe;

pub use candle::{Candle, Tick};
pub use direction::Direction;
pub use ids::{OrderId, PositionId, RefId, RegionId, TradeId};
pub use instrument::{Instrument, InstrumentError, TickPolicy, TradeMode};
pub use timeframe::{Timeframe, TimeframeError};
