//! Streaming Types
//!
//! Typed payloads delivered to listeners (trades, quotes, bars and order
//! updates) together with the lifecycle events and errors a stream emits.

mod events;
mod market_data;
mod trade_updates;

pub use events::{
    Connected, ConnectionState, Disconnected, EventKind, Reconnecting, StreamError, StreamEvent,
};
pub use market_data::{Bar, Quote, Trade};
pub use trade_updates::{Order, OrderEventType, OrderSide, TradeUpdate};
