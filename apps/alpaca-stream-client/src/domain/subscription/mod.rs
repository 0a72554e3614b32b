//! Subscription Ledger
//!
//! Tracks which symbols are subscribed per channel kind on a market data
//! stream and computes the minimal delta to send for each subscribe or
//! unsubscribe call.
//!
//! # Invariant
//!
//! A symbol present in a kind's set has had its subscribe message sent and
//! no matching unsubscribe message sent since. After a reconnect the ledger
//! is the source of truth for restoring server-side subscriptions, because
//! Alpaca does not remember them across connections.

use std::collections::{HashMap, HashSet};

// =============================================================================
// Types
// =============================================================================

/// A symbol string (stock ticker or crypto pair such as `BTC/USD`).
pub type Symbol = String;

/// Independent subscription axis within the market data protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Trade prints.
    Trades,
    /// Top-of-book quotes.
    Quotes,
    /// OHLCV bars (minute, daily and updated bars share this channel).
    Bars,
}

impl ChannelKind {
    /// Get all channel kinds, in wire order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Trades, Self::Quotes, Self::Bars]
    }

    /// Field name used for this kind in subscribe messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Quotes => "quotes",
            Self::Bars => "bars",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a subscription delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Start receiving the listed symbols.
    Subscribe,
    /// Stop receiving the listed symbols.
    Unsubscribe,
}

/// The delta the ledger asks the stream to send upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Subscribe or unsubscribe.
    pub action: SubscriptionAction,
    /// Channel the symbols belong to.
    pub kind: ChannelKind,
    /// Symbols in first-occurrence order. Never empty.
    pub symbols: Vec<Symbol>,
}

impl SubscriptionChange {
    fn new(action: SubscriptionAction, kind: ChannelKind, symbols: Vec<Symbol>) -> Option<Self> {
        if symbols.is_empty() {
            None
        } else {
            Some(Self {
                action,
                kind,
                symbols,
            })
        }
    }
}

// =============================================================================
// Per-kind state
// =============================================================================

/// Insertion-ordered symbol set for one channel kind.
#[derive(Debug, Default, Clone)]
struct KindState {
    order: Vec<Symbol>,
    members: HashSet<Symbol>,
}

impl KindState {
    /// Returns `true` if the symbol was newly added.
    fn insert(&mut self, symbol: &str) -> bool {
        if self.members.contains(symbol) {
            return false;
        }
        self.members.insert(symbol.to_string());
        self.order.push(symbol.to_string());
        true
    }

    /// Returns `true` if the symbol was present.
    fn remove(&mut self, symbol: &str) -> bool {
        if !self.members.remove(symbol) {
            return false;
        }
        self.order.retain(|s| s != symbol);
        true
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// =============================================================================
// Subscription Ledger
// =============================================================================

/// Per-kind record of the symbols a stream is subscribed to.
///
/// Pure data structure with no I/O; every operation is total.
///
/// # Example
///
/// ```rust
/// use alpaca_stream_client::domain::subscription::{ChannelKind, SubscriptionLedger};
///
/// let mut ledger = SubscriptionLedger::new();
///
/// let change = ledger.subscribe(ChannelKind::Trades, ["AAPL"]).unwrap();
/// assert_eq!(change.symbols, vec!["AAPL"]);
///
/// // Already tracked: nothing to send
/// assert!(ledger.subscribe(ChannelKind::Trades, ["AAPL"]).is_none());
///
/// let change = ledger.subscribe(ChannelKind::Trades, ["AAPL", "MSFT"]).unwrap();
/// assert_eq!(change.symbols, vec!["MSFT"]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct SubscriptionLedger {
    kinds: HashMap<ChannelKind, KindState>,
}

impl SubscriptionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `symbols` for `kind`.
    ///
    /// Returns a subscribe change holding only the symbols that were not
    /// already tracked, or `None` when there is nothing new.
    pub fn subscribe<I, S>(&mut self, kind: ChannelKind, symbols: I) -> Option<SubscriptionChange>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let state = self.kinds.entry(kind).or_default();
        let added: Vec<Symbol> = symbols
            .into_iter()
            .filter_map(|s| {
                let s = s.as_ref();
                state.insert(s).then(|| s.to_string())
            })
            .collect();

        SubscriptionChange::new(SubscriptionAction::Subscribe, kind, added)
    }

    /// Stop tracking `symbols` for `kind`.
    ///
    /// Returns an unsubscribe change holding only the symbols that were
    /// tracked; unknown symbols are ignored.
    pub fn unsubscribe<I, S>(
        &mut self,
        kind: ChannelKind,
        symbols: I,
    ) -> Option<SubscriptionChange>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let state = self.kinds.get_mut(&kind)?;
        let removed: Vec<Symbol> = symbols
            .into_iter()
            .filter_map(|s| {
                let s = s.as_ref();
                state.remove(s).then(|| s.to_string())
            })
            .collect();

        SubscriptionChange::new(SubscriptionAction::Unsubscribe, kind, removed)
    }

    /// Check whether `symbol` is tracked for `kind`.
    #[must_use]
    pub fn is_subscribed(&self, kind: ChannelKind, symbol: &str) -> bool {
        self.kinds
            .get(&kind)
            .is_some_and(|state| state.members.contains(symbol))
    }

    /// Symbols tracked for `kind`, in subscription order.
    #[must_use]
    pub fn subscribed(&self, kind: ChannelKind) -> Vec<Symbol> {
        self.kinds
            .get(&kind)
            .map(|state| state.order.clone())
            .unwrap_or_default()
    }

    /// Check whether any kind has tracked symbols.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.kinds.values().any(|state| !state.is_empty())
    }

    /// Forget every tracked symbol.
    pub fn clear(&mut self) {
        self.kinds.clear();
    }

    /// One subscribe change per non-empty kind, covering its full set.
    ///
    /// Used to restore subscriptions after a reconnect; does not mutate
    /// the ledger.
    #[must_use]
    pub fn resubscribe_changes(&self) -> Vec<SubscriptionChange> {
        ChannelKind::all()
            .iter()
            .filter_map(|kind| {
                SubscriptionChange::new(
                    SubscriptionAction::Subscribe,
                    *kind,
                    self.subscribed(*kind),
                )
            })
            .collect()
    }
}
