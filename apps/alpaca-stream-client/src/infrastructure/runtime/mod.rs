//! Stream Runtime
//!
//! Runs a stream adapter on its own tokio task. The task owns the adapter
//! together with its [`WebSocketTransport`] and [`TokioScheduler`], and reads
//! one input channel that carries caller operations, socket events and fired
//! timers. Every state transition therefore happens on that task, one input
//! at a time, and listeners run there too.
//!
//! ```text
//!  StreamClient ──call──┐
//!  socket task ──event──┼──► mpsc ──► actor task (owns the adapter)
//!  timer tasks ──token──┘                  │
//!                                          └──► watch<ConnectionState>
//! ```
//!
//! [`StreamClient`] is a cheap, cloneable handle. The task stops when
//! [`StreamClient::shutdown`] is called or the last handle is dropped.
//! Listeners run on the task, so a handle they capture keeps it alive;
//! capture a [`WeakStreamClient`] instead.

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::application::ports::{Scheduler, StreamPort, TimerToken, Transport, TransportEvent};
use crate::application::services::{EventPayload, Listener, listener};
use crate::domain::streaming::{
    Bar, Connected, ConnectionState, Disconnected, EventKind, Quote, Reconnecting, StreamError,
    Trade, TradeUpdate,
};
use crate::domain::subscription::{ChannelKind, Symbol};
use crate::infrastructure::alpaca::{
    CryptoDataStream, MarketDataProtocol, MarketDataStream, StockDataStream, TradeUpdatesStream,
};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::websocket::{
    HeartbeatConfig, TimerSink, TokioScheduler, TransportSink, WebSocketTransport,
};

/// Errors returned by [`StreamClient`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The stream task has stopped.
    #[error("stream client has shut down")]
    Closed,
}

type Call<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Input<S> {
    Call(Call<S>),
    Transport { generation: u64, event: TransportEvent },
    Timer(TimerToken),
}

/// Handle to a stream running on its own task.
///
/// Dropping the last handle stops the task. A handle moved into a listener
/// counts as well, and since listeners live on the task that forms a cycle
/// only [`shutdown`](Self::shutdown) breaks. Listeners that call back into
/// the client should capture [`downgrade`](Self::downgrade) instead.
pub struct StreamClient<S> {
    inputs: mpsc::UnboundedSender<Input<S>>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    guard: Arc<DropGuard>,
}

impl<S> Clone for StreamClient<S> {
    fn clone(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            guard: Arc::clone(&self.guard),
        }
    }
}

/// Handle that does not keep the stream task alive.
pub struct WeakStreamClient<S> {
    inputs: mpsc::WeakUnboundedSender<Input<S>>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    guard: Weak<DropGuard>,
}

impl<S> WeakStreamClient<S> {
    /// Get a full handle while some other handle still keeps the task alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<StreamClient<S>> {
        Some(StreamClient {
            guard: self.guard.upgrade()?,
            inputs: self.inputs.upgrade()?,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        })
    }
}

impl<S> Clone for WeakStreamClient<S> {
    fn clone(&self) -> Self {
        Self {
            inputs: self.inputs.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            guard: Weak::clone(&self.guard),
        }
    }
}

impl<S> fmt::Debug for WeakStreamClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStreamClient")
            .field("alive", &(self.guard.strong_count() > 0))
            .finish_non_exhaustive()
    }
}

impl<S> fmt::Debug for StreamClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("state", &*self.state.borrow())
            .field("closed", &self.inputs.is_closed())
            .finish_non_exhaustive()
    }
}

impl<S: StreamPort> StreamClient<S> {
    /// Spawn a stream task.
    ///
    /// `build` receives the task's transport and scheduler and returns the
    /// adapter to run. Must be called inside a tokio runtime.
    pub fn spawn<F>(heartbeat: HeartbeatConfig, build: F) -> Self
    where
        F: FnOnce(Box<dyn Transport>, Box<dyn Scheduler>) -> S,
    {
        let (tx, rx) = mpsc::unbounded_channel();

        let events = tx.clone();
        let transport_sink: TransportSink = Arc::new(move |generation, event| {
            // The receiver is gone only after shutdown.
            let _ = events.send(Input::Transport { generation, event });
        });
        let timers = tx.clone();
        let timer_sink: TimerSink = Arc::new(move |token| {
            let _ = timers.send(Input::Timer(token));
        });

        let transport = WebSocketTransport::new(heartbeat, transport_sink);
        let generation = transport.generation();
        let scheduler = TokioScheduler::new(timer_sink);
        let stream = build(Box::new(transport), Box::new(scheduler));

        let (state_tx, state_rx) = watch::channel(stream.connection_state());
        let cancel = CancellationToken::new();
        tokio::spawn(run(stream, rx, generation, state_tx, cancel.clone()));

        Self {
            inputs: tx,
            state: state_rx,
            guard: Arc::new(cancel.clone().drop_guard()),
            cancel,
        }
    }

    /// Run `f` against the stream on its task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn call<F>(&self, f: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.inputs
            .send(Input::Call(Box::new(f)))
            .map_err(|_| ClientError::Closed)
    }

    /// Run `f` against the stream on its task and return its result.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub async fn query<R, F>(&self, f: F) -> Result<R, ClientError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.call(move |stream| {
            let _ = tx.send(f(stream));
        })?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Start connecting.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.call(StreamPort::connect)
    }

    /// Close the connection, forget subscriptions and stop reconnecting.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.call(StreamPort::disconnect)
    }

    /// Connection state as of the last processed input.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Check if the handshake has completed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the stream reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task stops first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Register a listener for event payload `E`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on<E, F>(&self, f: F) -> Result<Listener<E>, ClientError>
    where
        E: EventPayload,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let handler = listener(f);
        let registered = Arc::clone(&handler);
        self.call(move |stream| {
            stream.events_mut().on(registered);
        })?;
        Ok(handler)
    }

    /// Listen for the handshake completing.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_connect<F>(&self, f: F) -> Result<Listener<Connected>, ClientError>
    where
        F: Fn(&Connected) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Listen for an established connection going away.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_disconnect<F>(&self, f: F) -> Result<Listener<Disconnected>, ClientError>
    where
        F: Fn(&Disconnected) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Listen for scheduled reconnect attempts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_reconnecting<F>(&self, f: F) -> Result<Listener<Reconnecting>, ClientError>
    where
        F: Fn(&Reconnecting) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Listen for errors.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_error<F>(&self, f: F) -> Result<Listener<StreamError>, ClientError>
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Remove a listener.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn off<E: EventPayload>(&self, listener: &Listener<E>) -> Result<(), ClientError> {
        let listener = Arc::clone(listener);
        self.call(move |stream| {
            stream.events_mut().off(&listener);
        })
    }

    /// Remove every listener for `kind`, or for all events when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) -> Result<(), ClientError> {
        self.call(move |stream| stream.remove_all_listeners(kind))
    }

    /// Disconnect and stop the stream task, waiting for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.inputs.closed().await;
    }

    /// Handle for use inside listeners; it does not keep the task alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakStreamClient<S> {
        WeakStreamClient {
            inputs: self.inputs.downgrade(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            guard: Arc::downgrade(&self.guard),
        }
    }
}

impl StreamClient<StockDataStream> {
    /// Spawn a stock market data stream.
    #[must_use]
    pub fn stock(config: &ClientConfig) -> Self {
        Self::market_data(config)
    }
}

impl StreamClient<CryptoDataStream> {
    /// Spawn a crypto market data stream.
    #[must_use]
    pub fn crypto(config: &ClientConfig) -> Self {
        Self::market_data(config)
    }
}

impl<P: MarketDataProtocol> StreamClient<MarketDataStream<P>> {
    /// Spawn a market data stream for protocol `P`.
    #[must_use]
    pub fn market_data(config: &ClientConfig) -> Self {
        Self::spawn(config.heartbeat, |transport, scheduler| {
            MarketDataStream::new(config, transport, scheduler)
        })
    }

    /// Subscribe `kind` to `symbols`, now or once connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn subscribe<I, T>(&self, kind: ChannelKind, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        let symbols: Vec<Symbol> = symbols.into_iter().map(Into::into).collect();
        self.call(move |stream| stream.subscribe(kind, symbols))
    }

    /// Unsubscribe `kind` from `symbols`, now or once connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn unsubscribe<I, T>(&self, kind: ChannelKind, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        let symbols: Vec<Symbol> = symbols.into_iter().map(Into::into).collect();
        self.call(move |stream| stream.unsubscribe(kind, symbols))
    }

    /// Subscribe to trades.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn subscribe_for_trades<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Trades, symbols)
    }

    /// Subscribe to quotes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn subscribe_for_quotes<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Quotes, symbols)
    }

    /// Subscribe to bars.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn subscribe_for_bars<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.subscribe(ChannelKind::Bars, symbols)
    }

    /// Unsubscribe from trades.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn unsubscribe_from_trades<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Trades, symbols)
    }

    /// Unsubscribe from quotes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn unsubscribe_from_quotes<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Quotes, symbols)
    }

    /// Unsubscribe from bars.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn unsubscribe_from_bars<I, T>(&self, symbols: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Symbol>,
    {
        self.unsubscribe(ChannelKind::Bars, symbols)
    }

    /// Symbols currently tracked for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub async fn subscribed(&self, kind: ChannelKind) -> Result<Vec<Symbol>, ClientError> {
        self.query(move |stream| stream.subscribed(kind)).await
    }

    /// Listen for trades.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_trade<F>(&self, f: F) -> Result<Listener<Trade>, ClientError>
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Listen for quotes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_quote<F>(&self, f: F) -> Result<Listener<Quote>, ClientError>
    where
        F: Fn(&Quote) + Send + Sync + 'static,
    {
        self.on(f)
    }

    /// Listen for bars.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_bar<F>(&self, f: F) -> Result<Listener<Bar>, ClientError>
    where
        F: Fn(&Bar) + Send + Sync + 'static,
    {
        self.on(f)
    }
}

impl StreamClient<TradeUpdatesStream> {
    /// Spawn a trade updates stream.
    #[must_use]
    pub fn trade_updates(config: &ClientConfig) -> Self {
        Self::spawn(config.heartbeat, |transport, scheduler| {
            TradeUpdatesStream::new(config, transport, scheduler)
        })
    }

    /// Start listening to trade updates, now or once connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn subscribe(&self) -> Result<(), ClientError> {
        self.call(TradeUpdatesStream::subscribe)
    }

    /// Stop listening to trade updates.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn unsubscribe(&self) -> Result<(), ClientError> {
        self.call(TradeUpdatesStream::unsubscribe)
    }

    /// Check if trade updates have been requested.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub async fn is_listening(&self) -> Result<bool, ClientError> {
        self.query(|stream| stream.is_listening()).await
    }

    /// Listen for order events.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the task has stopped.
    pub fn on_trade_update<F>(&self, f: F) -> Result<Listener<TradeUpdate>, ClientError>
    where
        F: Fn(&TradeUpdate) + Send + Sync + 'static,
    {
        self.on(f)
    }
}

async fn run<S: StreamPort>(
    mut stream: S,
    mut inputs: mpsc::UnboundedReceiver<Input<S>>,
    generation: Arc<AtomicU64>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stream.disconnect();
                publish(&state, stream.connection_state());
                tracing::debug!("stream task stopped");
                break;
            }
            input = inputs.recv() => {
                let Some(input) = input else { break };
                apply(&mut stream, input, &generation);
                publish(&state, stream.connection_state());
            }
        }
    }
}

fn apply<S: StreamPort>(stream: &mut S, input: Input<S>, generation: &AtomicU64) {
    match input {
        Input::Call(call) => call(stream),
        Input::Transport {
            generation: from,
            event,
        } => {
            if from == generation.load(Ordering::Acquire) {
                stream.handle_transport_event(event);
            } else {
                tracing::trace!(generation = from, "event from superseded socket dropped");
            }
        }
        Input::Timer(token) => stream.handle_timer(token),
    }
}

fn publish(state: &watch::Sender<ConnectionState>, current: ConnectionState) {
    state.send_if_modified(|published| {
        if *published == current {
            return false;
        }
        *published = current;
        true
    });
}
