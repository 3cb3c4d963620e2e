//! Inbound event types
//!
//! [`EventKind`] is the discriminator carried in `event_type` (or `type`);
//! [`InboundEvent`] is the decoded, validated frame.

use super::{
    ConnectionEstablished, ErrorEvent, Heartbeat, ResultUpdate, StageTransition, StatusStreaming,
    StatusUpdate, SubscriptionConfirmed,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusUpdate,
    ResultUpdate,
    Error,
    Heartbeat,
    ConnectionEstablished,
    StageTransition,
    StatusStreaming,
    SubscriptionConfirmed,
}

impl EventKind {
    pub const ALL: [Self; 8] = [
        Self::StatusUpdate,
        Self::ResultUpdate,
        Self::Error,
        Self::Heartbeat,
        Self::ConnectionEstablished,
        Self::StageTransition,
        Self::StatusStreaming,
        Self::SubscriptionConfirmed,
    ];

    /// Get the wire name of the event type
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusUpdate => "status_update",
            Self::ResultUpdate => "result_update",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
            Self::ConnectionEstablished => "connection_established",
            Self::StageTransition => "stage_transition",
            Self::StatusStreaming => "status_streaming",
            Self::SubscriptionConfirmed => "subscription_confirmed",
        }
    }

    /// Parse an event type from its wire name
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "status_update" => Some(Self::StatusUpdate),
            "result_update" => Some(Self::ResultUpdate),
            "error" => Some(Self::Error),
            "heartbeat" => Some(Self::Heartbeat),
            "connection_established" => Some(Self::ConnectionEstablished),
            "stage_transition" => Some(Self::StageTransition),
            "status_streaming" => Some(Self::StatusStreaming),
            "subscription_confirmed" => Some(Self::SubscriptionConfirmed),
            _ => None,
        }
    }

    /// Events that describe the progress of an analysis
    #[must_use]
    pub const fn is_progress(self) -> bool {
        matches!(
            self,
            Self::StatusUpdate | Self::StageTransition | Self::StatusStreaming | Self::ResultUpdate
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded and validated inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    StatusUpdate(StatusUpdate),
    ResultUpdate(ResultUpdate),
    Error(ErrorEvent),
    Heartbeat(Heartbeat),
    ConnectionEstablished(ConnectionEstablished),
    StageTransition(StageTransition),
    StatusStreaming(StatusStreaming),
    SubscriptionConfirmed(SubscriptionConfirmed),
}

impl InboundEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StatusUpdate(_) => EventKind::StatusUpdate,
            Self::ResultUpdate(_) => EventKind::ResultUpdate,
            Self::Error(_) => EventKind::Error,
            Self::Heartbeat(_) => EventKind::Heartbeat,
            Self::ConnectionEstablished(_) => EventKind::ConnectionEstablished,
            Self::StageTransition(_) => EventKind::StageTransition,
            Self::StatusStreaming(_) => EventKind::StatusStreaming,
            Self::SubscriptionConfirmed(_) => EventKind::SubscriptionConfirmed,
        }
    }

    /// Analysis the event refers to, when the frame names one
    #[must_use]
    pub fn analysis_id(&self) -> Option<&str> {
        match self {
            Self::StatusUpdate(e) => Some(&e.analysis_id),
            Self::ResultUpdate(e) => Some(&e.analysis_id),
            Self::StageTransition(e) => Some(&e.analysis_id),
            Self::StatusStreaming(e) => Some(&e.analysis_id),
            Self::SubscriptionConfirmed(e) => Some(&e.analysis_id),
            Self::Error(e) => e.analysis_id.as_deref(),
            Self::ConnectionEstablished(e) => e.analysis_id.as_deref(),
            Self::Heartbeat(_) => None,
        }
    }

    /// True for a heartbeat frame carrying `pong`
    #[must_use]
    pub fn is_pong(&self) -> bool {
        matches!(self, Self::Heartbeat(hb) if hb.is_pong())
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.analysis_id() {
            Some(id) => write!(f, "InboundEvent({}, analysis_id={id})", self.kind()),
            None => write!(f, "InboundEvent({})", self.kind()),
        }
    }
}
