//! Tokio Adapters
//!
//! Concrete [`Transport`](crate::application::ports::Transport) and
//! [`Scheduler`](crate::application::ports::Scheduler) implementations used
//! by the stream runtime:
//!
//! - [`WebSocketTransport`]: `tokio-tungstenite` sockets over rustls, with a
//!   ping heartbeat
//! - [`TokioScheduler`]: one-shot timers on `tokio::time`

mod heartbeat;
mod scheduler;
mod transport;

pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use scheduler::{TimerSink, TokioScheduler};
pub use transport::{TransportError, TransportSink, WebSocketTransport};
