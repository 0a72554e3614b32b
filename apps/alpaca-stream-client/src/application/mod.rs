//! Application Layer - Ports and services.
//!
//! The ports define how stream state machines talk to sockets and timers;
//! the services hold the logic that is independent of any Alpaca endpoint.

/// Port interfaces (transport, scheduler, stream surface).
pub mod ports;

/// Event dispatch with listener isolation.
pub mod services;
