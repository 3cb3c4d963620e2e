//! Application-level heartbeat
//!
//! Ping/pong liveness tracking for a connected socket.

mod monitor;

pub use monitor::{HeartbeatMonitor, HeartbeatTick};
