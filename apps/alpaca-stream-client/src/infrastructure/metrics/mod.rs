//! Stream Metrics Module
//!
//! Counters and gauges recorded through the `metrics` facade. The crate
//! installs no recorder; applications pick their own exporter, and without
//! one every call is a no-op.
//!
//! # Metrics
//!
//! - `alpaca_stream_messages_received_total{stream}`: decoded messages
//! - `alpaca_stream_events_total{stream,event}`: market and order events delivered
//! - `alpaca_stream_reconnects_total{stream}`: scheduled reconnect attempts
//! - `alpaca_stream_errors_total{stream,error_type}`: errors by kind
//! - `alpaca_stream_connected{stream}`: 1 while authenticated

use metrics::{counter, describe_counter, describe_gauge, gauge};

use crate::domain::streaming::EventKind;

const MESSAGES_RECEIVED: &str = "alpaca_stream_messages_received_total";
const EVENTS: &str = "alpaca_stream_events_total";
const RECONNECTS: &str = "alpaca_stream_reconnects_total";
const ERRORS: &str = "alpaca_stream_errors_total";
const CONNECTED: &str = "alpaca_stream_connected";

// =============================================================================
// Metric Registration
// =============================================================================

/// Describe every metric to the installed recorder.
///
/// Call once after installing a recorder so exporters can show help text.
pub fn register_metrics() {
    describe_counter!(MESSAGES_RECEIVED, "Total messages decoded from Alpaca streams");
    describe_counter!(EVENTS, "Total market data and order events delivered to listeners");
    describe_counter!(RECONNECTS, "Total reconnection attempts scheduled");
    describe_counter!(ERRORS, "Total stream errors by type");
    describe_gauge!(CONNECTED, "Whether the stream is authenticated (1) or not (0)");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record decoded messages from one frame.
pub fn record_messages_received(stream: &'static str, count: usize) {
    counter!(MESSAGES_RECEIVED, "stream" => stream).increment(count as u64);
}

/// Record an event delivered to listeners.
pub fn record_event(stream: &'static str, kind: EventKind) {
    counter!(EVENTS, "stream" => stream, "event" => kind.as_str()).increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect(stream: &'static str) {
    counter!(RECONNECTS, "stream" => stream).increment(1);
}

/// Record an error.
pub fn record_error(stream: &'static str, error_type: &'static str) {
    counter!(ERRORS, "stream" => stream, "error_type" => error_type).increment(1);
}

/// Update the connected gauge.
pub fn set_connected(stream: &'static str, connected: bool) {
    gauge!(CONNECTED, "stream" => stream).set(if connected { 1.0 } else { 0.0 });
}
