//! Port Interfaces
//!
//! Contracts between the stream state machines and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: a message socket the connection opens, writes to and closes
//! - [`Scheduler`]: one-shot timers for connect timeouts and reconnect backoff
//!
//! Both are fire-and-forget: outcomes come back as [`TransportEvent`]s and
//! fired [`TimerToken`]s that the runtime feeds into the stream, so the state
//! machines never block and tests can drive them by hand.
//!
//! ## Driver Ports (Inbound)
//!
//! - [`StreamPort`]: the surface every protocol adapter exposes to callers

use std::time::Duration;

use crate::application::services::{EventDispatcher, EventPayload, Listener, listener};
use crate::domain::streaming::{
    Connected, ConnectionState, Disconnected, EventKind, Reconnecting, StreamError,
};

// =============================================================================
// Transport
// =============================================================================

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (JSON).
    Text(String),
    /// Binary frame (MessagePack, or UTF-8 JSON from some endpoints).
    Binary(Vec<u8>),
}

/// Options applied when opening a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// Ask the server for MessagePack frames.
    pub msgpack: bool,
}

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open.
    Opened,
    /// A frame arrived.
    Message(Frame),
    /// The socket failed. A `Closed` event follows.
    Error(String),
    /// The socket is gone.
    Closed,
}

/// A message socket.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Start opening a socket to `url`, replacing any current one.
    fn open(&mut self, url: &str, options: OpenOptions);

    /// Queue a frame on the open socket.
    fn send(&mut self, frame: Frame);

    /// Close the socket. Events from the closed socket are not delivered.
    fn close(&mut self);
}

// =============================================================================
// Scheduler
// =============================================================================

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    /// Wrap a raw timer id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw timer id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// One-shot timers.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send {
    /// Fire `token` back to the stream after `delay`.
    fn set_timer(&mut self, delay: Duration) -> TimerToken;

    /// Cancel a pending timer. Unknown or fired tokens are ignored.
    fn cancel(&mut self, token: TimerToken);
}

// =============================================================================
// Stream Port
// =============================================================================

/// Operations shared by every stream adapter.
pub trait StreamPort: Send + 'static {
    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Start connecting. Ignored while connecting or connected.
    fn connect(&mut self);

    /// Close the connection, forget subscriptions and stop reconnecting.
    fn disconnect(&mut self);

    /// Listener registry for this stream.
    fn events_mut(&mut self) -> &mut EventDispatcher;

    /// Feed a transport event into the stream.
    fn handle_transport_event(&mut self, event: TransportEvent);

    /// Feed a fired timer into the stream.
    fn handle_timer(&mut self, token: TimerToken);

    /// Check if the handshake has completed.
    fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Listen for the handshake completing.
    fn on_connect<F>(&mut self, f: F) -> Listener<Connected>
    where
        F: Fn(&Connected) + Send + Sync + 'static,
        Self: Sized,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Listen for an established connection going away.
    fn on_disconnect<F>(&mut self, f: F) -> Listener<Disconnected>
    where
        F: Fn(&Disconnected) + Send + Sync + 'static,
        Self: Sized,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Listen for scheduled reconnect attempts.
    fn on_reconnecting<F>(&mut self, f: F) -> Listener<Reconnecting>
    where
        F: Fn(&Reconnecting) + Send + Sync + 'static,
        Self: Sized,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Listen for errors.
    fn on_error<F>(&mut self, f: F) -> Listener<StreamError>
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
        Self: Sized,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Remove a listener. Returns `false` if it was not registered.
    fn off<E: EventPayload>(&mut self, listener: &Listener<E>) -> bool
    where
        Self: Sized,
    {
        self.events_mut().off(listener)
    }

    /// Remove every listener for `kind`, or for all events when `None`.
    fn remove_all_listeners(&mut self, kind: Option<EventKind>) {
        self.events_mut().remove_all_listeners(kind);
    }
}
