//! Reconnection backoff

mod policy;

pub use policy::{ReconnectPolicy, ReconnectState};
