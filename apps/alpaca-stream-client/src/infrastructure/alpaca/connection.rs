//! Connection State Machine
//!
//! Drives one socket through `disconnected → connecting → authenticating →
//! connected`, shared by every stream adapter. The machine is synchronous:
//! the runtime feeds it [`TransportEvent`]s and fired timers, and it acts
//! through the injected [`Transport`] and [`Scheduler`].
//!
//! # Lifecycle
//!
//! - `connect()` opens the socket and arms the connect timeout.
//! - On open the handshake is sent right away, or after the server's
//!   `{"T":"success","msg":"connected"}` greeting, depending on the stream.
//! - Authentication moves to `connected`, resets the backoff, emits
//!   `connected` and hands the pending actions back to the adapter.
//! - A close schedules a reconnect unless the caller disconnected or the
//!   server rejected the credentials.
//!
//! Actions requested while not connected wait in a FIFO queue
//! ([`Connection::queue_or_send`]) and are returned exactly once, in order,
//! on the next authentication.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;

use super::codec::{Codec, Encoding};
use super::messages::{ControlMessage, OutboundMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    Frame, OpenOptions, Scheduler, TimerToken, Transport, TransportEvent,
};
use crate::application::services::EventDispatcher;
use crate::domain::streaming::{
    Connected, ConnectionState, Disconnected, Reconnecting, StreamError, StreamEvent,
};
use crate::infrastructure::metrics;

/// Default time allowed for open plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// When the handshake frame goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeTiming {
    /// As soon as the socket opens.
    OnOpen,
    /// After the server's `connected` greeting.
    AfterGreeting,
}

/// Everything a connection needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Stream label for logs and metrics.
    pub name: &'static str,
    /// Socket URL.
    pub url: String,
    /// Handshake frame.
    pub handshake: OutboundMessage,
    /// When the handshake is sent.
    pub handshake_timing: HandshakeTiming,
    /// Wire encoding.
    pub encoding: Encoding,
    /// Time allowed to reach `connected`.
    pub connect_timeout: Duration,
    /// Backoff settings.
    pub reconnect: ReconnectConfig,
}

/// What the adapter should do with one inbound message.
#[derive(Debug, PartialEq)]
pub enum Inbound<A> {
    /// Control frame consumed by the connection.
    Handled,
    /// Just authenticated: restore subscriptions, then run these actions.
    Ready(Vec<A>),
    /// The connection was torn down; skip the rest of the frame.
    Closed,
    /// Application message for the adapter.
    Message(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Socket {
    Idle,
    Opening,
    Open,
}

/// Connection state machine, generic over the adapter's deferred action.
pub struct Connection<A> {
    name: &'static str,
    url: String,
    handshake: OutboundMessage,
    handshake_timing: HandshakeTiming,
    codec: Codec,
    connect_timeout: Duration,
    transport: Box<dyn Transport>,
    scheduler: Box<dyn Scheduler>,
    reconnect: ReconnectPolicy,
    state: ConnectionState,
    socket: Socket,
    pending: VecDeque<A>,
    connect_timer: Option<TimerToken>,
    reconnect_timer: Option<TimerToken>,
    auto_reconnect: bool,
    events: EventDispatcher,
}

impl<A> Connection<A> {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(
        settings: ConnectionSettings,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            name: settings.name,
            url: settings.url,
            handshake: settings.handshake,
            handshake_timing: settings.handshake_timing,
            codec: Codec::new(settings.encoding),
            connect_timeout: settings.connect_timeout,
            transport,
            scheduler,
            reconnect: ReconnectPolicy::new(settings.reconnect),
            state: ConnectionState::Disconnected,
            socket: Socket::Idle,
            pending: VecDeque::new(),
            connect_timer: None,
            reconnect_timer: None,
            auto_reconnect: false,
            events: EventDispatcher::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Socket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of actions waiting for the next authentication.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Listener registry.
    pub const fn events_mut(&mut self) -> &mut EventDispatcher {
        &mut self.events
    }

    /// Deliver an event to listeners.
    pub fn emit(&self, event: StreamEvent) {
        self.events.emit(&event);
    }

    // =========================================================================
    // Caller Operations
    // =========================================================================

    /// Open the socket. Ignored while connecting or connected.
    ///
    /// Re-enables automatic reconnection and starts a fresh backoff sequence.
    pub fn connect(&mut self) {
        if self.state.is_active() {
            tracing::debug!(stream = self.name, state = %self.state, "connect ignored");
            return;
        }
        self.auto_reconnect = true;
        self.reconnect.reset();
        self.cancel_reconnect_timer();
        self.open();
    }

    /// Tear everything down and stop reconnecting. Safe in any state.
    ///
    /// Pending actions are dropped.
    pub fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.cancel_connect_timer();
        self.cancel_reconnect_timer();
        self.pending.clear();
        self.teardown();

        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        if previous.is_active() {
            tracing::info!(stream = self.name, from = %previous, "disconnected by caller");
            metrics::set_connected(self.name, false);
        }
        if previous == ConnectionState::Connected {
            self.emit(StreamEvent::Disconnected(Disconnected));
        }
    }

    /// Write a message if the socket is open; otherwise drop it.
    pub fn send(&mut self, message: &OutboundMessage) {
        if self.socket != Socket::Open {
            tracing::debug!(
                stream = self.name,
                action = message.action(),
                "socket not open, message dropped"
            );
            return;
        }
        match self.codec.encode(message) {
            Ok(frame) => {
                tracing::debug!(stream = self.name, action = message.action(), "sending");
                self.transport.send(frame);
            }
            Err(e) => {
                tracing::error!(
                    stream = self.name,
                    action = message.action(),
                    error = %e,
                    "failed to encode message"
                );
            }
        }
    }

    /// Hand `action` back to run now if connected; otherwise queue it.
    pub fn queue_or_send(&mut self, action: A) -> Option<A> {
        if self.is_connected() {
            Some(action)
        } else {
            self.pending.push_back(action);
            None
        }
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Feed a transport event. Returns the decoded messages of a frame.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<Value> {
        match event {
            TransportEvent::Opened => {
                self.on_open();
                Vec::new()
            }
            TransportEvent::Message(frame) => self.decode(&frame),
            TransportEvent::Error(reason) => {
                self.on_transport_error(reason);
                Vec::new()
            }
            TransportEvent::Closed => {
                self.on_close();
                Vec::new()
            }
        }
    }

    /// Handle the universal control frames; pass everything else through.
    pub fn handle_message(&mut self, message: Value) -> Inbound<A> {
        match ControlMessage::parse(&message) {
            Some(ControlMessage::Connected) => {
                if self.handshake_timing == HandshakeTiming::AfterGreeting
                    && self.state == ConnectionState::Authenticating
                {
                    self.send_handshake();
                }
                Inbound::Handled
            }
            Some(ControlMessage::Authenticated) => {
                self.authenticated().map_or(Inbound::Handled, Inbound::Ready)
            }
            Some(ControlMessage::Error(err)) if err.is_auth_error() => {
                self.authentication_failed(Some(err.code), err.msg);
                Inbound::Closed
            }
            Some(ControlMessage::Error(err)) => {
                tracing::warn!(
                    stream = self.name,
                    code = err.code,
                    message = %err.msg,
                    "server error"
                );
                self.report(StreamError::Server {
                    code: err.code,
                    message: err.msg,
                });
                Inbound::Handled
            }
            None => Inbound::Message(message),
        }
    }

    /// Complete the handshake. Returns the pending actions, or `None` if
    /// the connection was not waiting for authentication.
    pub fn authenticated(&mut self) -> Option<Vec<A>> {
        if self.state != ConnectionState::Authenticating {
            tracing::debug!(
                stream = self.name,
                state = %self.state,
                "unexpected authentication ignored"
            );
            return None;
        }
        self.state = ConnectionState::Connected;
        self.cancel_connect_timer();
        self.reconnect.reset();
        metrics::set_connected(self.name, true);
        tracing::info!(stream = self.name, pending = self.pending.len(), "authenticated");

        self.emit(StreamEvent::Connected(Connected));
        Some(self.pending.drain(..).collect())
    }

    /// The server rejected the credentials: report, tear down and stay down.
    pub fn authentication_failed(&mut self, code: Option<i32>, message: String) {
        tracing::error!(
            stream = self.name,
            code = ?code,
            message = %message,
            "authentication failed"
        );
        self.auto_reconnect = false;
        self.report(StreamError::Authentication { code, message });
        self.teardown();
        self.handle_close();
    }

    /// Feed a fired timer. Unknown tokens are ignored.
    pub fn handle_timer(&mut self, token: TimerToken) {
        if self.connect_timer == Some(token) {
            self.connect_timer = None;
            self.on_connect_timeout();
        } else if self.reconnect_timer == Some(token) {
            self.reconnect_timer = None;
            if self.auto_reconnect && self.state == ConnectionState::Disconnected {
                self.open();
            }
        } else {
            tracing::trace!(stream = self.name, token = token.id(), "stale timer ignored");
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn open(&mut self) {
        self.state = ConnectionState::Connecting;
        self.socket = Socket::Opening;
        tracing::info!(stream = self.name, url = %self.url, "connecting");

        let options = OpenOptions {
            msgpack: self.codec.encoding() == Encoding::MsgPack,
        };
        self.transport.open(&self.url, options);

        self.cancel_connect_timer();
        self.connect_timer = Some(self.scheduler.set_timer(self.connect_timeout));
    }

    fn send_handshake(&mut self) {
        let handshake = self.handshake.clone();
        self.send(&handshake);
    }

    fn decode(&self, frame: &Frame) -> Vec<Value> {
        if self.socket != Socket::Open {
            tracing::trace!(stream = self.name, "frame for closed socket ignored");
            return Vec::new();
        }
        match self.codec.decode(frame) {
            Ok(messages) => {
                metrics::record_messages_received(self.name, messages.len());
                messages
            }
            Err(e) => {
                tracing::warn!(stream = self.name, error = %e, "dropping malformed frame");
                metrics::record_error(self.name, "protocol");
                Vec::new()
            }
        }
    }

    fn on_open(&mut self) {
        if self.socket != Socket::Opening {
            tracing::debug!(stream = self.name, "unexpected open ignored");
            return;
        }
        self.socket = Socket::Open;
        self.state = ConnectionState::Authenticating;
        tracing::info!(stream = self.name, "socket open, authenticating");

        if self.handshake_timing == HandshakeTiming::OnOpen {
            self.send_handshake();
        }
    }

    fn on_transport_error(&self, reason: String) {
        tracing::warn!(stream = self.name, error = %reason, "transport error");
        self.report(StreamError::Transport(reason));
    }

    fn on_close(&mut self) {
        if self.socket == Socket::Idle {
            tracing::trace!(stream = self.name, "close for torn-down socket ignored");
            return;
        }
        self.socket = Socket::Idle;
        self.handle_close();
    }

    fn on_connect_timeout(&mut self) {
        if self.state == ConnectionState::Connected {
            return;
        }
        tracing::warn!(
            stream = self.name,
            state = %self.state,
            timeout_ms = duration_ms(self.connect_timeout),
            "connect timed out"
        );
        self.report(StreamError::Timeout(self.connect_timeout));
        self.teardown();
        self.handle_close();
    }

    /// Common close path: reset state, notify, maybe schedule a reconnect.
    fn handle_close(&mut self) {
        self.cancel_connect_timer();
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        metrics::set_connected(self.name, false);
        tracing::info!(stream = self.name, from = %previous, "connection closed");

        if previous == ConnectionState::Connected {
            self.emit(StreamEvent::Disconnected(Disconnected));
        }
        if self.auto_reconnect {
            self.schedule_reconnect();
        } else {
            tracing::debug!(stream = self.name, "reconnect suppressed");
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_timer.is_some() {
            return;
        }
        let Some(delay) = self.reconnect.next_delay() else {
            let attempts = self.reconnect.attempt_count();
            tracing::error!(stream = self.name, attempts, "reconnect attempts exhausted");
            self.auto_reconnect = false;
            self.report(StreamError::ReconnectExhausted(attempts));
            return;
        };
        let attempt = self.reconnect.attempt_count();
        self.reconnect_timer = Some(self.scheduler.set_timer(delay));
        metrics::record_reconnect(self.name);
        tracing::info!(
            stream = self.name,
            attempt,
            delay_ms = duration_ms(delay),
            "reconnect scheduled"
        );

        self.emit(StreamEvent::Reconnecting(Reconnecting { attempt, delay }));
    }

    fn teardown(&mut self) {
        if self.socket != Socket::Idle {
            self.transport.close();
            self.socket = Socket::Idle;
        }
    }

    fn report(&self, error: StreamError) {
        metrics::record_error(self.name, error.label());
        self.emit(StreamEvent::Error(error));
    }

    fn cancel_connect_timer(&mut self) {
        if let Some(token) = self.connect_timer.take() {
            self.scheduler.cancel(token);
        }
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(token) = self.reconnect_timer.take() {
            self.scheduler.cancel(token);
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
