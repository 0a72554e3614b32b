//! Connection states, stream events and the error taxonomy.

use std::fmt;
use std::time::Duration;

use super::market_data::{Bar, Quote, Trade};
use super::trade_updates::TradeUpdate;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket, or the socket was torn down.
    #[default]
    Disconnected,
    /// Socket open requested, waiting for the transport.
    Connecting,
    /// Socket open, handshake sent or about to be sent.
    Authenticating,
    /// Handshake acknowledged; subscriptions may be sent.
    Connected,
}

impl ConnectionState {
    /// Check if a connection attempt is in flight or established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Get the lowercase name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Lifecycle Payloads
// =============================================================================

/// Payload of the `connected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connected;

/// Payload of the `disconnected` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disconnected;

/// Payload of the `reconnecting` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnecting {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Delay before the attempt starts.
    pub delay: Duration,
}

// =============================================================================
// Events
// =============================================================================

/// Event identifiers, used to address listeners without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Handshake acknowledged.
    Connected,
    /// An established connection was lost or closed.
    Disconnected,
    /// A reconnect attempt was scheduled.
    Reconnecting,
    /// Something went wrong.
    Error,
    /// Trade print.
    Trade,
    /// Quote.
    Quote,
    /// Bar.
    Bar,
    /// Order lifecycle event.
    TradeUpdate,
}

impl EventKind {
    /// Get all event kinds.
    #[must_use]
    pub const fn all() -> [Self; 8] {
        [
            Self::Connected,
            Self::Disconnected,
            Self::Reconnecting,
            Self::Error,
            Self::Trade,
            Self::Quote,
            Self::Bar,
            Self::TradeUpdate,
        ]
    }

    /// Get the event name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Bar => "bar",
            Self::TradeUpdate => "trade_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by a stream, each variant carrying its own payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Handshake acknowledged.
    Connected(Connected),
    /// An established connection was lost or closed.
    Disconnected(Disconnected),
    /// A reconnect attempt was scheduled.
    Reconnecting(Reconnecting),
    /// Something went wrong.
    Error(StreamError),
    /// Trade print.
    Trade(Trade),
    /// Quote.
    Quote(Quote),
    /// Bar.
    Bar(Bar),
    /// Order lifecycle event.
    TradeUpdate(Box<TradeUpdate>),
}

impl StreamEvent {
    /// Get the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected(_) => EventKind::Connected,
            Self::Disconnected(_) => EventKind::Disconnected,
            Self::Reconnecting(_) => EventKind::Reconnecting,
            Self::Error(_) => EventKind::Error,
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::Bar(_) => EventKind::Bar,
            Self::TradeUpdate(_) => EventKind::TradeUpdate,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced to `error` listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The socket reported a failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server sent an error frame that is not an authentication failure.
    #[error("server error {code}: {message}")]
    Server {
        /// Alpaca error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Credentials were rejected; automatic reconnection is suppressed.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Alpaca error code, when the server sent one.
        code: Option<i32>,
        /// Error message.
        message: String,
    },

    /// The handshake did not complete in time.
    #[error("connection not established within {0:?}")]
    Timeout(Duration),

    /// A listener panicked.
    #[error("{event} listener panicked: {message}")]
    Handler {
        /// Event the listener was registered for.
        event: EventKind,
        /// Panic message.
        message: String,
    },

    /// The reconnect attempt limit was reached.
    #[error("giving up after {0} reconnect attempts")]
    ReconnectExhausted(u32),
}

impl StreamError {
    /// Check if this error is an authentication failure.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Get a short label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Server { .. } => "server",
            Self::Authentication { .. } => "authentication",
            Self::Timeout(_) => "timeout",
            Self::Handler { .. } => "handler",
            Self::ReconnectExhausted(_) => "reconnect_exhausted",
        }
    }
}
