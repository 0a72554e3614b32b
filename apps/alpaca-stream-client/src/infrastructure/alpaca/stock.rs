//! Stock Data Stream
//!
//! Real-time stock trades, quotes and bars.
//!
//! # Stream URL
//!
//! - Live: `wss://stream.data.alpaca.markets/v2/{feed}`
//! - Paper: `wss://stream.data.sandbox.alpaca.markets/v2/{feed}`
//!
//! where `{feed}` is `sip`, `iex` or `delayed_sip`.

use super::market_data::{MarketDataProtocol, MarketDataStream};
use crate::infrastructure::config::ClientConfig;

/// Stock market data protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockProtocol;

impl MarketDataProtocol for StockProtocol {
    const NAME: &'static str = "stock";

    fn url(config: &ClientConfig) -> String {
        config.stock_stream_url()
    }
}

/// Stock market data stream.
pub type StockDataStream = MarketDataStream<StockProtocol>;
