//! WebSocket close codes
//!
//! Close codes the analysis endpoints send, and how the client reacts to them.

use serde::{Deserialize, Serialize};

/// Close codes observed from the analysis server
///
/// The server closes with 1008 when token verification fails and with 1013
/// when the per-user connection limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure
    Normal = 1000,
    /// Server shutting down or page navigating away
    GoingAway = 1001,
    /// Connection dropped without a close frame
    Abnormal = 1006,
    /// Token missing or rejected
    PolicyViolation = 1008,
    /// Unexpected server-side failure
    InternalError = 1011,
    /// Too many connections for this user
    TryAgainLater = 1013,
    /// Application-level authentication failure
    Unauthorized = 4001,
    /// Authenticated but not allowed to watch this analysis
    Forbidden = 4003,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1006 => Some(Self::Abnormal),
            1008 => Some(Self::PolicyViolation),
            1011 => Some(Self::InternalError),
            1013 => Some(Self::TryAgainLater),
            4001 => Some(Self::Unauthorized),
            4003 => Some(Self::Forbidden),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// The server refused the credentials; retrying with the same token is pointless
    #[must_use]
    pub const fn is_auth_failure(self) -> bool {
        matches!(self, Self::PolicyViolation | Self::Unauthorized | Self::Forbidden)
    }

    /// Check if the client should attempt to reconnect after this close code
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !self.is_auth_failure()
    }

    /// Reconnect decision for a raw code; unknown codes are treated as transient
    #[must_use]
    pub fn raw_should_reconnect(code: u16) -> bool {
        Self::from_u16(code).map_or(true, Self::should_reconnect)
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal closure",
            Self::GoingAway => "Endpoint going away",
            Self::Abnormal => "Connection closed abnormally",
            Self::PolicyViolation => "Authentication rejected",
            Self::InternalError => "Internal server error",
            Self::TryAgainLater => "Connection limit reached",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Abnormal => "Abnormal",
            Self::PolicyViolation => "PolicyViolation",
            Self::InternalError => "InternalError",
            Self::TryAgainLater => "TryAgainLater",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
