//! Connection lifecycle
//!
//! [`ConnectionController`] is the public handle. The event loop behind it
//! runs the heartbeat, reconnection and the outbound queue; the socket lives
//! on its own I/O task.

mod controller;
mod endpoint;
mod event_loop;
mod link;
mod queue;
mod state;

pub use controller::ConnectionController;
pub use endpoint::{build_url, redacted};
pub use queue::{OutboundQueue, QueueFullError, SendOutcome};
pub use state::{ConnectionState, ConnectionStats};
