//! Subscription Management Integration Tests
//!
//! Ledger properties exercised through the public API: deltas only carry
//! real changes, repeated requests are idempotent, and the resubscribe set
//! after a reconnect covers exactly what is tracked.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use alpaca_stream_client::domain::subscription::SubscriptionAction;
use alpaca_stream_client::{ChannelKind, SubscriptionLedger};

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Subscribe(ChannelKind, Vec<String>),
    Unsubscribe(ChannelKind, Vec<String>),
}

fn kind() -> impl Strategy<Value = ChannelKind> {
    prop_oneof![
        Just(ChannelKind::Trades),
        Just(ChannelKind::Quotes),
        Just(ChannelKind::Bars),
    ]
}

fn symbols() -> impl Strategy<Value = Vec<String>> {
    // Small alphabet so operations collide often.
    prop::collection::vec(
        prop::sample::select(vec!["AAPL", "MSFT", "TSLA", "SPY", "BTC/USD"]),
        0..6,
    )
    .prop_map(|v| v.into_iter().map(str::to_string).collect())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (kind(), symbols()).prop_map(|(k, s)| Op::Subscribe(k, s)),
        (kind(), symbols()).prop_map(|(k, s)| Op::Unsubscribe(k, s)),
    ]
}

/// Reference model: a plain set per kind.
fn model(ops: &[Op]) -> HashMap<ChannelKind, BTreeSet<String>> {
    let mut model: HashMap<ChannelKind, BTreeSet<String>> = HashMap::new();
    for op in ops {
        match op {
            Op::Subscribe(kind, symbols) => {
                model.entry(*kind).or_default().extend(symbols.iter().cloned());
            }
            Op::Unsubscribe(kind, symbols) => {
                let set = model.entry(*kind).or_default();
                for symbol in symbols {
                    set.remove(symbol);
                }
            }
        }
    }
    model
}

fn apply(ledger: &mut SubscriptionLedger, op: &Op) {
    match op {
        Op::Subscribe(kind, symbols) => {
            ledger.subscribe(*kind, symbols);
        }
        Op::Unsubscribe(kind, symbols) => {
            ledger.unsubscribe(*kind, symbols);
        }
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn test_ledger_matches_set_model(ops in prop::collection::vec(op(), 0..40)) {
        let mut ledger = SubscriptionLedger::new();
        for op in &ops {
            apply(&mut ledger, op);
        }

        let expected = model(&ops);
        for kind in ChannelKind::all() {
            let tracked: BTreeSet<String> = ledger.subscribed(*kind).into_iter().collect();
            let want = expected.get(kind).cloned().unwrap_or_default();
            prop_assert_eq!(tracked, want);
        }
    }

    #[test]
    fn test_resubscribe_covers_every_tracked_symbol(ops in prop::collection::vec(op(), 0..40)) {
        let mut ledger = SubscriptionLedger::new();
        for op in &ops {
            apply(&mut ledger, op);
        }

        let changes = ledger.resubscribe_changes();

        for change in &changes {
            prop_assert_eq!(change.action, SubscriptionAction::Subscribe);
            prop_assert!(!change.symbols.is_empty());
            prop_assert_eq!(&change.symbols, &ledger.subscribed(change.kind));
        }
        let covered: usize = changes.iter().map(|c| c.symbols.len()).sum();
        let tracked: usize = ChannelKind::all().iter().map(|k| ledger.subscribed(*k).len()).sum();
        prop_assert_eq!(covered, tracked);
        prop_assert_eq!(changes.is_empty(), !ledger.has_any());
    }

    #[test]
    fn test_repeated_subscribe_is_idempotent(kind in kind(), symbols in symbols()) {
        let mut ledger = SubscriptionLedger::new();

        ledger.subscribe(kind, &symbols);
        let before = ledger.subscribed(kind);

        prop_assert!(ledger.subscribe(kind, &symbols).is_none());
        prop_assert_eq!(ledger.subscribed(kind), before);
    }

    #[test]
    fn test_deltas_only_carry_changes(
        existing in symbols(),
        requested in symbols(),
        kind in kind(),
    ) {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(kind, &existing);

        if let Some(change) = ledger.subscribe(kind, &requested) {
            let unique: BTreeSet<&String> = change.symbols.iter().collect();
            prop_assert_eq!(unique.len(), change.symbols.len());
            for symbol in &change.symbols {
                prop_assert!(!existing.contains(symbol));
                prop_assert!(requested.contains(symbol));
            }
        }

        if let Some(change) = ledger.unsubscribe(kind, &requested) {
            prop_assert_eq!(change.action, SubscriptionAction::Unsubscribe);
            for symbol in &change.symbols {
                prop_assert!(!ledger.is_subscribed(kind, symbol));
            }
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_kinds_are_tracked_independently() {
    let mut ledger = SubscriptionLedger::new();

    ledger.subscribe(ChannelKind::Trades, ["AAPL"]);
    ledger.subscribe(ChannelKind::Quotes, ["AAPL", "MSFT"]);
    ledger.unsubscribe(ChannelKind::Trades, ["AAPL"]);

    assert!(ledger.subscribed(ChannelKind::Trades).is_empty());
    assert_eq!(ledger.subscribed(ChannelKind::Quotes), vec!["AAPL", "MSFT"]);
    assert!(ledger.unsubscribe(ChannelKind::Bars, ["AAPL"]).is_none());
}

#[test]
fn test_clear_leaves_nothing_to_resubscribe() {
    let mut ledger = SubscriptionLedger::new();
    ledger.subscribe(ChannelKind::Bars, ["SPY"]);

    ledger.clear();

    assert!(!ledger.has_any());
    assert!(ledger.resubscribe_changes().is_empty());
}
