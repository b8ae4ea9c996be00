//! Wire-level messages: trades in, indicator events out.

pub mod indicator;
pub mod trade;

pub use indicator::RsiEvent;
pub use trade::TradeEvent;
