//! Market Data Stream
//!
//! The subscribe/unsubscribe contract shared by the stock and crypto data
//! streams. A [`MarketDataProtocol`] supplies what differs between them (URL,
//! handshake, message classification); [`MarketDataStream`] composes it with
//! the [`Connection`] state machine and a [`SubscriptionLedger`].
//!
//! # Subscriptions across reconnects
//!
//! Subscribe and unsubscribe calls made while not connected are queued as
//! [`MarketDataAction`]s. The ledger only changes when an action runs, so
//! after authentication the stream first restores whatever the ledger holds
//! from earlier connections, then runs the queued actions in order. Symbols
//! already restored produce no second message.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::auth::Credentials;
use super::connection::{Connection, ConnectionSettings, HandshakeTiming, Inbound};
use super::messages::{OutboundMessage, SubscriptionMessage, SubscriptionRequest};
use crate::application::ports::{Scheduler, StreamPort, TimerToken, Transport, TransportEvent};
use crate::application::services::{EventDispatcher, Listener, listener};
use crate::domain::streaming::{Bar, ConnectionState, Quote, StreamEvent, Trade};
use crate::domain::subscription::{ChannelKind, SubscriptionLedger, Symbol};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;

// =============================================================================
// Protocol
// =============================================================================

/// What distinguishes one market data endpoint from another.
pub trait MarketDataProtocol: Send + 'static {
    /// Stream label for logs and metrics.
    const NAME: &'static str;

    /// Socket URL for `config`.
    fn url(config: &ClientConfig) -> String;

    /// Handshake frame, sent after the server's `connected` greeting.
    fn auth_message(credentials: &Credentials) -> OutboundMessage {
        credentials.market_data_auth()
    }

    /// Map an application message to an event, or consume it.
    fn classify(message: Value) -> Option<StreamEvent> {
        classify_market_data(Self::NAME, message)
    }
}

/// Classify the `T`-tagged frames common to stock and crypto streams.
///
/// Trades, quotes and minute/daily/updated bars become events; subscription
/// acknowledgments are logged and consumed. Unknown tags and records that
/// fail to parse are dropped.
pub fn classify_market_data(stream: &'static str, message: Value) -> Option<StreamEvent> {
    let tag = message.get("T").and_then(Value::as_str).map(str::to_owned)?;
    match tag.as_str() {
        "t" => parse(stream, &tag, message).map(StreamEvent::Trade),
        "q" => parse(stream, &tag, message).map(StreamEvent::Quote),
        "b" | "d" | "u" => parse(stream, &tag, message).map(StreamEvent::Bar),
        "subscription" => {
            if let Some(ack) = parse::<SubscriptionMessage>(stream, &tag, message) {
                tracing::debug!(
                    stream,
                    trades = ?ack.trades,
                    quotes = ?ack.quotes,
                    bars = ?ack.bars,
                    "subscription confirmed"
                );
            }
            None
        }
        _ => {
            tracing::trace!(stream, tag = %tag, "unhandled message type");
            None
        }
    }
}

fn parse<T: DeserializeOwned>(stream: &'static str, tag: &str, message: Value) -> Option<T> {
    match serde_json::from_value(message) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(stream, tag, error = %e, "dropping unparseable message");
            metrics::record_error(stream, "protocol");
            None
        }
    }
}

// =============================================================================
// Stream
// =============================================================================

/// A subscription request waiting for the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataAction {
    /// Subscribe `kind` to the symbols.
    Subscribe(ChannelKind, Vec<Symbol>),
    /// Unsubscribe `kind` from the symbols.
    Unsubscribe(ChannelKind, Vec<Symbol>),
}

/// A market data stream speaking protocol `P`.
pub struct MarketDataStream<P> {
    connection: Connection<MarketDataAction>,
    ledger: SubscriptionLedger,
    protocol: PhantomData<fn() -> P>,
}

impl<P: MarketDataProtocol> MarketDataStream<P> {
    /// Create a disconnected stream.
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self::with_url(config, P::url(config), transport, scheduler)
    }

    /// Create a disconnected stream that connects to `url` instead of the
    /// protocol's endpoint (proxies, local test servers).
    #[must_use]
    pub fn with_url(
        config: &ClientConfig,
        url: impl Into<String>,
        transport: Box<dyn Transport>,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        let settings = ConnectionSettings {
            name: P::NAME,
            url: url.into(),
            handshake: P::auth_message(&config.credentials),
            handshake_timing: HandshakeTiming::AfterGreeting,
            encoding: config.encoding,
            connect_timeout: config.connect_timeout,
            reconnect: config.reconnect.clone(),
        };
        Self {
            connection: Connection::new(settings, transport, scheduler),
            ledger: SubscriptionLedger::new(),
            protocol: PhantomData,
        }
    }

    /// Socket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Subscribe `kind` to `symbols`, now or once connected.
    pub fn subscribe<I, S>(&mut self, kind: ChannelKind, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let symbols = symbols.into_iter().map(Into::into).collect();
        self.request(MarketDataAction::Subscribe(kind, symbols));
    }

    /// Unsubscribe `kind` from `symbols`, now or once connected.
    pub fn unsubscribe<I, S>(&mut self, kind: ChannelKind, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let symbols = symbols.into_iter().map(Into::into).collect();
        self.request(MarketDataAction::Unsubscribe(kind, symbols));
    }

    /// Subscribe to trades.
    pub fn subscribe_for_trades<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Trades, symbols);
    }

    /// Subscribe to quotes.
    pub fn subscribe_for_quotes<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Quotes, symbols);
    }

    /// Subscribe to bars.
    pub fn subscribe_for_bars<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Bars, symbols);
    }

    /// Unsubscribe from trades.
    pub fn unsubscribe_from_trades<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Trades, symbols);
    }

    /// Unsubscribe from quotes.
    pub fn unsubscribe_from_quotes<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Quotes, symbols);
    }

    /// Unsubscribe from bars.
    pub fn unsubscribe_from_bars<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Bars, symbols);
    }

    /// Symbols currently subscribed for `kind`.
    #[must_use]
    pub fn subscribed(&self, kind: ChannelKind) -> Vec<Symbol> {
        self.ledger.subscribed(kind)
    }

    /// Check whether `symbol` is subscribed for `kind`.
    #[must_use]
    pub fn is_subscribed(&self, kind: ChannelKind, symbol: &str) -> bool {
        self.ledger.is_subscribed(kind, symbol)
    }

    /// Requests waiting for the next authentication.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.connection.pending_len()
    }

    /// Listen for trades.
    pub fn on_trade<F>(&mut self, f: F) -> Listener<Trade>
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Listen for quotes.
    pub fn on_quote<F>(&mut self, f: F) -> Listener<Quote>
    where
        F: Fn(&Quote) + Send + Sync + 'static,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    /// Listen for bars (minute, daily and updated).
    pub fn on_bar<F>(&mut self, f: F) -> Listener<Bar>
    where
        F: Fn(&Bar) + Send + Sync + 'static,
    {
        let handler = listener(f);
        self.events_mut().on(handler.clone());
        handler
    }

    fn request(&mut self, action: MarketDataAction) {
        if let Some(action) = self.connection.queue_or_send(action) {
            self.apply(action);
        } else {
            tracing::debug!(stream = P::NAME, "not connected, subscription queued");
        }
    }

    fn apply(&mut self, action: MarketDataAction) {
        let change = match action {
            MarketDataAction::Subscribe(kind, symbols) => self.ledger.subscribe(kind, &symbols),
            MarketDataAction::Unsubscribe(kind, symbols) => self.ledger.unsubscribe(kind, &symbols),
        };
        if let Some(change) = change {
            tracing::info!(
                stream = P::NAME,
                action = ?change.action,
                kind = %change.kind,
                count = change.symbols.len(),
                "updating subscriptions"
            );
            self.connection
                .send(&OutboundMessage::Subscription(SubscriptionRequest::from(&change)));
        }
    }

    fn on_ready(&mut self, actions: Vec<MarketDataAction>) {
        for change in self.ledger.resubscribe_changes() {
            tracing::info!(
                stream = P::NAME,
                kind = %change.kind,
                count = change.symbols.len(),
                "restoring subscriptions"
            );
            self.connection
                .send(&OutboundMessage::Subscription(SubscriptionRequest::from(&change)));
        }
        for action in actions {
            self.apply(action);
        }
    }

    fn on_message(&self, message: Value) {
        if let Some(event) = P::classify(message) {
            metrics::record_event(P::NAME, event.kind());
            self.connection.emit(event);
        }
    }
}

impl<P: MarketDataProtocol> StreamPort for MarketDataStream<P> {
    fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    fn connect(&mut self) {
        self.connection.connect();
    }

    fn disconnect(&mut self) {
        self.connection.disconnect();
        self.ledger.clear();
    }

    fn events_mut(&mut self) -> &mut EventDispatcher {
        self.connection.events_mut()
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        for message in self.connection.handle_transport_event(event) {
            match self.connection.handle_message(message) {
                Inbound::Handled => {}
                Inbound::Ready(actions) => self.on_ready(actions),
                Inbound::Closed => break,
                Inbound::Message(message) => self.on_message(message),
            }
        }
    }

    fn handle_timer(&mut self, token: TimerToken) {
        self.connection.handle_timer(token);
    }
}

impl<P> std::fmt::Debug for MarketDataStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataStream")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
