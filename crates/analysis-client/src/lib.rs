//! # analysis-client
//!
//! Self-healing WebSocket client for analysis progress streams.
//!
//! - [`ConnectionController`]: connect, heartbeat, backoff reconnect, polling fallback
//! - [`EventDispatcher`]: per-event-type listener registry
//! - [`AnalysisWatch`]: folds the stream into an [`AnalysisProgress`] snapshot

pub mod auth;
pub mod connection;
pub mod dispatch;
pub mod heartbeat;
pub mod reconnect;
pub mod transport;
pub mod watch;

pub use auth::{SharedToken, StaticToken, TokenProvider};
pub use connection::{ConnectionController, ConnectionState, ConnectionStats, SendOutcome};
pub use dispatch::{EventDispatcher, ListenerHandle};
pub use heartbeat::{HeartbeatMonitor, HeartbeatTick};
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use transport::{Connector, Transport, TransportEvent, WsConnector};
pub use watch::{AnalysisProgress, AnalysisWatch};
