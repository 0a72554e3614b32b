//! Event Dispatcher
//!
//! Typed listener registry with panic isolation. Every event has its own
//! listener list keyed by payload type, so registering a trade listener
//! gets a `&Trade` and nothing else.
//!
//! A listener that panics does not stop delivery to the listeners after it:
//! the panic is caught and re-emitted as [`StreamError::Handler`] on the
//! `error` event. A panic inside an `error` listener is only logged, so a
//! broken error listener cannot loop.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::streaming::{
    Bar, Connected, Disconnected, EventKind, Quote, Reconnecting, StreamError, StreamEvent, Trade,
    TradeUpdate,
};

/// A registered event listener.
///
/// Listeners are compared by identity: registering the same `Arc` twice is
/// a no-op, and [`EventDispatcher::off`] removes the `Arc` it is given.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener<E>(a: &Listener<E>, b: &Listener<E>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Ordered listener list for one event.
pub struct Listeners<E> {
    entries: Vec<Listener<E>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<E> Listeners<E> {
    fn add(&mut self, listener: Listener<E>) -> bool {
        if self.entries.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        self.entries.push(listener);
        true
    }

    fn remove(&mut self, listener: &Listener<E>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|l| !same_listener(l, listener));
        self.entries.len() != before
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invoke every listener, collecting panic messages.
    fn invoke(&self, payload: &E) -> Vec<String> {
        let mut failures = Vec::new();
        for listener in &self.entries {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(payload)));
            if let Err(cause) = outcome {
                failures.push(panic_message(cause.as_ref()));
            }
        }
        failures
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    cause
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| cause.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// A payload type that can be listened for.
pub trait EventPayload: Sized + 'static {
    /// Event this payload belongs to.
    const KIND: EventKind;

    /// Borrow this event's listener list.
    fn listeners(dispatcher: &EventDispatcher) -> &Listeners<Self>;

    /// Mutably borrow this event's listener list.
    fn listeners_mut(dispatcher: &mut EventDispatcher) -> &mut Listeners<Self>;
}

macro_rules! event_payload {
    ($payload:ty, $kind:ident, $field:ident) => {
        impl EventPayload for $payload {
            const KIND: EventKind = EventKind::$kind;

            fn listeners(dispatcher: &EventDispatcher) -> &Listeners<Self> {
                &dispatcher.$field
            }

            fn listeners_mut(dispatcher: &mut EventDispatcher) -> &mut Listeners<Self> {
                &mut dispatcher.$field
            }
        }
    };
}

event_payload!(Connected, Connected, connected);
event_payload!(Disconnected, Disconnected, disconnected);
event_payload!(Reconnecting, Reconnecting, reconnecting);
event_payload!(StreamError, Error, error);
event_payload!(Trade, Trade, trade);
event_payload!(Quote, Quote, quote);
event_payload!(Bar, Bar, bar);
event_payload!(TradeUpdate, TradeUpdate, trade_update);

/// Listener registry for one stream.
#[derive(Default)]
pub struct EventDispatcher {
    connected: Listeners<Connected>,
    disconnected: Listeners<Disconnected>,
    reconnecting: Listeners<Reconnecting>,
    error: Listeners<StreamError>,
    trade: Listeners<Trade>,
    quote: Listeners<Quote>,
    bar: Listeners<Bar>,
    trade_update: Listeners<TradeUpdate>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::all() {
            map.entry(&kind.as_str(), &self.listener_count(kind));
        }
        map.finish()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn on<E: EventPayload>(&mut self, listener: Listener<E>) -> bool {
        E::listeners_mut(self).add(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off<E: EventPayload>(&mut self, listener: &Listener<E>) -> bool {
        E::listeners_mut(self).remove(listener)
    }

    /// Remove every listener for `kind`, or for all events when `None`.
    pub fn remove_all_listeners(&mut self, kind: Option<EventKind>) {
        let Some(kind) = kind else {
            for kind in EventKind::all() {
                self.remove_all_listeners(Some(kind));
            }
            return;
        };
        match kind {
            EventKind::Connected => self.connected.clear(),
            EventKind::Disconnected => self.disconnected.clear(),
            EventKind::Reconnecting => self.reconnecting.clear(),
            EventKind::Error => self.error.clear(),
            EventKind::Trade => self.trade.clear(),
            EventKind::Quote => self.quote.clear(),
            EventKind::Bar => self.bar.clear(),
            EventKind::TradeUpdate => self.trade_update.clear(),
        }
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::Connected => self.connected.len(),
            EventKind::Disconnected => self.disconnected.len(),
            EventKind::Reconnecting => self.reconnecting.len(),
            EventKind::Error => self.error.len(),
            EventKind::Trade => self.trade.len(),
            EventKind::Quote => self.quote.len(),
            EventKind::Bar => self.bar.len(),
            EventKind::TradeUpdate => self.trade_update.len(),
        }
    }

    /// Deliver an event to its listeners in registration order.
    pub fn emit(&self, event: &StreamEvent) {
        match event {
            StreamEvent::Connected(payload) => self.deliver(payload),
            StreamEvent::Disconnected(payload) => self.deliver(payload),
            StreamEvent::Reconnecting(payload) => self.deliver(payload),
            StreamEvent::Error(payload) => self.deliver(payload),
            StreamEvent::Trade(payload) => self.deliver(payload),
            StreamEvent::Quote(payload) => self.deliver(payload),
            StreamEvent::Bar(payload) => self.deliver(payload),
            StreamEvent::TradeUpdate(payload) => self.deliver(payload.as_ref()),
        }
    }

    fn deliver<E: EventPayload>(&self, payload: &E) {
        let failures = E::listeners(self).invoke(payload);
        for message in failures {
            if E::KIND == EventKind::Error {
                tracing::error!(panic = %message, "error listener panicked");
                continue;
            }
            tracing::warn!(event = %E::KIND, panic = %message, "listener panicked");
            self.deliver(&StreamError::Handler {
                event: E::KIND,
                message,
            });
        }
    }
}
