//! Application Services
//!
//! - [`EventDispatcher`]: typed listener registry shared by every stream

mod dispatcher;

pub use dispatcher::{EventDispatcher, EventPayload, Listener, Listeners, listener};
