//! Trade Updates Stream
//!
//! Real-time order events (fills, cancellations, rejections and status
//! changes) for the account behind the credentials.
//!
//! # Stream URL
//!
//! - Live: `wss://api.alpaca.markets/stream`
//! - Paper: `wss://paper-api.alpaca.markets/stream`
//!
//! # Protocol
//!
//! JSON only, with its own vocabulary. The `authenticate` handshake goes out
//! as soon as the socket opens, and every server frame is wrapped in a
//! `{"stream": ..., "data": ...}` envelope. Instead of per-symbol
//! subscriptions the client asks to `listen` to the `trade_updates` stream;
//! the stream remembers that request and repeats it after a reconnect.

use std::ops::ControlFlow;

use serde_json::Value;

use super::codec::Encoding;
use super::connection::{Connection, ConnectionSettings, HandshakeTiming, Inbound};
use super::messages::{ListenRequest, OutboundMessage, TradingMessage};
use crate::application::ports::{Scheduler, StreamPort, TimerToken, Transport, TransportEvent};
use crate::application::services::{EventDispatcher, Listener, listener};
use crate::domain::streaming::{ConnectionState, EventKind, StreamEvent, TradeUpdate};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;

const NAME: &str = "trade_updates";

/// A listen request waiting for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenAction {
    /// Start receiving trade updates.
    Listen,
    /// Stop receiving trade updates.
    Unlisten,
}

/// Trade updates stream.
pub struct TradeUpdatesStream {
    connection: Connection<ListenAction>,
    listening: bool,
}

impl TradeUpdatesStream {
    /// Create a disconnected stream.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self::with_url(config, config.trade_updates_url(), transport, scheduler)
    }

    /// Create a disconnected stream that connects to `url`.
    #[must_use]
    pub fn with_url(
        config: &ClientConfig,
        url: impl Into<String>,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let settings = ConnectionSettings {
            name: NAME,
            url: url.into(),
            handshake: config.credentials.trade_updates_auth(),
            handshake_timing: HandshakeTiming::OnOpen,
            encoding: Encoding::Json,
            connect_timeout: config.connect_timeout,
            reconnect: config.reconnect.clone(),
        };
        Self {
            connection: Connection::new(settings, transport, scheduler),
            listening: false,
        }
    }

    /// Socket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Start listening to trade updates, now or once connected.
    pub fn subscribe(&mut self) {
        self.request(ListenAction::Listen);
    }

    /// Stop listening to trade updates, now or once connected.
    pub fn unsubscribe(&mut self) {
        self.request(ListenAction::Unlisten);
    }

    /// Check if the server has been asked to send trade updates.
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Listen for order events.
    pub fn on_trade_update<F>(&mut self, f: F) -> Listener<TradeUpdate>
    where
        F: Fn(&TradeUpdate) + Send + Sync + 'static,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    fn request(&mut self, action: ListenAction) {
        if let Some(action) = self.connection.queue_or_send(action) {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: ListenAction) {
        let listen = action == ListenAction::Listen;
        if listen == self.listening {
            return;
        }
        self.listening = listen;
        self.send_listen();
    }

    fn send_listen(&mut self) {
        let request = if self.listening {
            ListenRequest::trade_updates()
        } else {
            ListenRequest::none()
        };
        tracing::info!(stream = NAME, listening = self.listening, "updating listen streams");
        self.connection.send(&OutboundMessage::Listen(request));
    }

    fn on_ready(&mut self, actions: Vec<ListenAction>) {
        if self.listening {
            self.send_listen();
        }
        for action in actions {
            self.apply(action);
        }
    }

    fn on_message(&mut self, message: Value) -> ControlFlow<()> {
        let message = match serde_json::from_value::<TradingMessage>(message) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(stream = NAME, error = %e, "dropping unparseable message");
                metrics::record_error(NAME, "protocol");
                return ControlFlow::Continue(());
            }
        };

        match message {
            TradingMessage::Authorization(auth) if auth.is_authorized() => {
                if let Some(actions) = self.connection.authenticated() {
                    self.on_ready(actions);
                }
            }
            TradingMessage::Authorization(auth) if auth.is_unauthorized() => {
                self.connection.authentication_failed(
                    None,
                    format!("{} rejected: {}", auth.action, auth.status),
                );
                return ControlFlow::Break(());
            }
            TradingMessage::Authorization(auth) => {
                tracing::debug!(
                    stream = NAME,
                    status = %auth.status,
                    action = %auth.action,
                    "authorization frame ignored"
                );
            }
            TradingMessage::Listening(data) => {
                tracing::info!(stream = NAME, streams = ?data.streams, "listening");
            }
            TradingMessage::TradeUpdates(update) => {
                tracing::debug!(
                    stream = NAME,
                    event = ?update.event,
                    order_id = %update.order.id,
                    "trade update received"
                );
                metrics::record_event(NAME, EventKind::TradeUpdate);
                self.connection.emit(StreamEvent::TradeUpdate(update));
            }
        }
        ControlFlow::Continue(())
    }
}

impl StreamPort for TradeUpdatesStream {
    fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    fn connect(&mut self) {
        self.connection.connect();
    }

    fn disconnect(&mut self) {
        self.connection.disconnect();
        self.listening = false;
    }

    fn events_mut(&mut self) -> &mut EventDispatcher {
        self.connection.events_mut()
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        for message in self.connection.handle_transport_event(event) {
            let flow = match self.connection.handle_message(message) {
                Inbound::Handled => ControlFlow::Continue(()),
                Inbound::Ready(actions) => {
                    self.on_ready(actions);
                    ControlFlow::Continue(())
                }
                Inbound::Closed => ControlFlow::Break(()),
                Inbound::Message(message) => self.on_message(message),
            };
            if flow.is_break() {
                break;
            }
        }
    }

    fn handle_timer(&mut self, token: TimerToken) {
        self.connection.handle_timer(token);
    }
}

impl std::fmt::Debug for TradeUpdatesStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeUpdatesStream")
            .field("listening", &self.listening)
            .finish_non_exhaustive()
    }
}
