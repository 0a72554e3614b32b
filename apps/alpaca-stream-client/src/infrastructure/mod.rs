//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the port interfaces defined in the
//! application layer, plus the runtime that drives them.

/// Alpaca protocol adapters (stock data, crypto data, trade updates).
pub mod alpaca;

/// Client configuration.
pub mod config;

/// Metrics instrumentation through the `metrics` facade.
pub mod metrics;

/// Tokio actor that owns a stream adapter.
pub mod runtime;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// tokio-tungstenite transport and tokio timers.
pub mod websocket;
