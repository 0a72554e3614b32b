#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Alpaca Stream Client - Reconnecting WebSocket Streams
//!
//! Client for Alpaca's streaming APIs: stock market data, crypto market
//! data and trade updates. Each stream authenticates, tracks its
//! subscriptions, queues requests made while offline, and reconnects with
//! exponential backoff, replaying subscriptions once the handshake succeeds.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core streaming types
//!   - `streaming`: Trades, quotes, bars, trade updates, lifecycle events
//!   - `subscription`: Subscription ledger per channel kind
//!
//! - **Application**: Ports and services
//!   - `ports`: Transport, scheduler and stream surface traits
//!   - `services`: Event dispatcher with listener isolation
//!
//! - **Infrastructure**: Adapters and runtime
//!   - `alpaca`: Connection state machine and protocol adapters
//!   - `websocket`: tokio-tungstenite transport, tokio timers
//!   - `runtime`: Actor task behind [`StreamClient`]
//!   - `config`: Configuration from code or environment
//!   - `metrics`, `telemetry`: Instrumentation
//!
//! # Data Flow
//!
//! ```text
//! Alpaca WS ─► WebSocketTransport ─┐
//!                                  ├─► actor task ─► Connection ─► adapter ─► EventDispatcher ─► listeners
//! TokioScheduler (timers) ─────────┘        ▲
//!                                           └── StreamClient (subscribe, connect, ...)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use alpaca_stream_client::{ClientConfig, StreamClient};
//!
//! let config = ClientConfig::from_env()?;
//! let stocks = StreamClient::stock(&config);
//! stocks.on_trade(|trade| println!("{} @ {}", trade.symbol, trade.price))?;
//! stocks.subscribe_for_trades(["AAPL", "MSFT"])?;
//! stocks.connect()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    Bar, Connected, ConnectionState, Disconnected, EventKind, Order, OrderEventType, OrderSide,
    Quote, Reconnecting, StreamError, StreamEvent, Trade, TradeUpdate,
};
pub use domain::subscription::{ChannelKind, SubscriptionChange, SubscriptionLedger, Symbol};

// Ports and services
pub use application::ports::{
    Frame, OpenOptions, Scheduler, StreamPort, TimerToken, Transport, TransportEvent,
};
pub use application::services::{EventDispatcher, EventPayload, Listener, listener};

// Stream adapters
pub use infrastructure::alpaca::{
    AuthError, CryptoDataStream, Credentials, Encoding, MarketDataProtocol, MarketDataStream,
    ReconnectConfig, StockDataStream, TradeUpdatesStream,
};

// Configuration
pub use infrastructure::config::{
    ClientConfig, ConfigError, CryptoLocation, DataFeed, Environment, load_dotenv,
};

// Runtime
pub use infrastructure::runtime::{ClientError, StreamClient, WeakStreamClient};
pub use infrastructure::websocket::HeartbeatConfig;

// Metrics
pub use infrastructure::metrics::register_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
