//! Event fan-out
//!
//! Listener registries for inbound events, state transitions and errors.

mod dispatcher;
mod listeners;

pub use dispatcher::EventDispatcher;
pub use listeners::{ErrorListener, EventListener, ListenerHandle, StateListener, Topic};
