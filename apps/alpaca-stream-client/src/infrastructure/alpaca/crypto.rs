//! Crypto Data Stream
//!
//! Real-time crypto trades, quotes and bars. Symbols are pairs such as
//! `BTC/USD`; sizes are fractional.
//!
//! # Stream URL
//!
//! - Live: `wss://stream.data.alpaca.markets/v1beta3/crypto/{location}`
//! - Paper: `wss://stream.data.sandbox.alpaca.markets/v1beta3/crypto/{location}`
//!
//! where `{location}` is `us`, `us-1` or `eu-1`.

use super::market_data::{MarketDataProtocol, MarketDataStream};
use crate::infrastructure::config::ClientConfig;

/// Crypto market data protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoProtocol;

impl MarketDataProtocol for CryptoProtocol {
    const NAME: &'static str = "crypto";

    fn url(config: &ClientConfig) -> String {
        config.crypto_stream_url()
    }
}

/// Crypto market data stream.
pub type CryptoDataStream = MarketDataStream<CryptoProtocol>;
