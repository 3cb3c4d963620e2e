//! Connection state and counters

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Lifecycle state of a [`ConnectionController`](super::ConnectionController)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the reconnect timer
    Reconnecting,
    /// Last attempt failed; see the error listeners for the cause
    Error,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// A connection attempt is in flight or scheduled
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a controller's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Frames dropped by the codec
    pub frames_rejected: u64,
    /// Successful connections after the first one
    pub reconnects: u64,
    /// Connection attempts made by the current recovery sequence
    pub reconnect_attempts: u32,
    pub queued: usize,
    pub dropped_from_queue: u64,
}

/// Counters written by the connection loop and read by handles
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    state: parking_lot::RwLock<ConnectionState>,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    frames_rejected: AtomicU64,
    connections: AtomicU64,
    reconnect_attempts: AtomicU32,
    queued: AtomicUsize,
    dropped_from_queue: AtomicU64,
}

impl SharedState {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub(crate) fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connected(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    pub(crate) fn set_queued(&self, queued: usize) {
        self.queued.store(queued, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_from_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            state: self.state(),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            reconnects: self.connections.load(Ordering::Relaxed).saturating_sub(1),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped_from_queue: self.dropped_from_queue.load(Ordering::Relaxed),
        }
    }
}
