//! Domain Layer - Core streaming types and subscription bookkeeping.
//!
//! Pure data and pure logic: no sockets, timers or runtime. Everything here
//! is serializable where it crosses the wire and testable in isolation.

/// Stream events, market data records and trade updates.
pub mod streaming;

/// Subscription tracking per channel kind.
pub mod subscription;
