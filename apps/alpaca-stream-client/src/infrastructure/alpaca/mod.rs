//! Alpaca WebSocket Adapters
//!
//! Protocol adapters for Alpaca's streaming endpoints, all driven by one
//! shared [`Connection`] state machine:
//!
//! - **Stock**: equity trades, quotes and bars (JSON or `MessagePack`)
//! - **Crypto**: crypto trades, quotes and bars (JSON or `MessagePack`)
//! - **Trade Updates**: order fills and status changes (JSON)

pub mod auth;
pub mod codec;
pub mod connection;
pub mod crypto;
pub mod market_data;
pub mod messages;
pub mod reconnect;
pub mod stock;
pub mod trading;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, Credentials};
pub use codec::{Codec, CodecError, Encoding};
pub use connection::{
    Connection, ConnectionSettings, DEFAULT_CONNECT_TIMEOUT, HandshakeTiming, Inbound,
};
pub use crypto::{CryptoDataStream, CryptoProtocol};
pub use market_data::{MarketDataAction, MarketDataProtocol, MarketDataStream, classify_market_data};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use stock::{StockDataStream, StockProtocol};
pub use trading::{ListenAction, TradeUpdatesStream};
