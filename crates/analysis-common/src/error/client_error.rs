//! Client error types
//!
//! One taxonomy shared by the codec, the connection controller and the
//! listeners that observe it.

use crate::config::ConfigError;
use std::fmt;

/// Errors surfaced by the analysis stream client
///
/// Cloneable so the same failure can be handed to every error listener and to
/// every caller awaiting `connect()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Socket-level failure while opening, reading or writing
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unrecognized frame; the frame is dropped
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No pong received within {timeout_ms}ms")]
    HeartbeatTimeout { timeout_ms: u64 },

    /// The server rejected the credentials (policy close codes)
    #[error("Authentication rejected (close code {code}): {reason}")]
    Auth { code: u16, reason: String },

    #[error("Reconnection gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connection not established within {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// The controller was disconnected or shut down
    #[error("Connection closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Stable code for logs and listeners
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::HeartbeatTimeout { .. } => "HEARTBEAT_TIMEOUT",
            Self::Auth { .. } => "AUTH_ERROR",
            Self::ReconnectExhausted { .. } => "RECONNECT_EXHAUSTED",
            Self::ConnectTimeout { .. } => "CONNECT_TIMEOUT",
            Self::QueueFull { .. } => "QUEUE_FULL",
            Self::Closed => "CLOSED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Fatal errors stop automatic recovery; only a manual reconnect resumes
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::ReconnectExhausted { .. } | Self::Config(_) | Self::Closed
        )
    }

    /// Errors that feed the reconnection state machine
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::HeartbeatTimeout { .. } | Self::ConnectTimeout { .. }
        )
    }

    #[must_use]
    pub fn transport(msg: impl fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    #[must_use]
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    #[must_use]
    pub fn auth(code: u16, reason: impl fmt::Display) -> Self {
        Self::Auth {
            code,
            reason: reason.to_string(),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
