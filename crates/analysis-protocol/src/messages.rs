//! Outbound control messages
//!
//! Every message the client sends has the shape `{id, type, payload, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Client to server message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundType {
    /// Heartbeat request; the server answers with a `pong` heartbeat
    Ping,
    Subscribe,
    Unsubscribe,
    /// Follow an additional analysis on a status stream connection
    SubscribeAnalysis,
    UnsubscribeAnalysis,
    /// Ask for a progress snapshot (`/ws/analysis`)
    GetProgress,
    /// Ask for a streaming status snapshot (`/ws/status`)
    GetCurrentStatus,
}

impl OutboundType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::SubscribeAnalysis => "subscribe_analysis",
            Self::UnsubscribeAnalysis => "unsubscribe_analysis",
            Self::GetProgress => "get_progress",
            Self::GetCurrentStatus => "get_current_status",
        }
    }
}

impl fmt::Display for OutboundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message queued for, or written to, the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: OutboundType,

    #[serde(default)]
    pub payload: Value,

    pub timestamp: DateTime<Utc>,
}

impl OutboundMessage {
    /// Create a message stamped with a fresh id and the current time
    #[must_use]
    pub fn new(kind: OutboundType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn ping() -> Self {
        Self::new(OutboundType::Ping, json!({}))
    }

    #[must_use]
    pub fn subscribe(analysis_id: impl Into<String>) -> Self {
        Self::new(
            OutboundType::Subscribe,
            json!({ "analysis_id": analysis_id.into() }),
        )
    }

    #[must_use]
    pub fn unsubscribe(analysis_id: impl Into<String>) -> Self {
        Self::new(
            OutboundType::Unsubscribe,
            json!({ "analysis_id": analysis_id.into() }),
        )
    }

    #[must_use]
    pub fn subscribe_analysis(analysis_id: impl Into<String>) -> Self {
        Self::new(
            OutboundType::SubscribeAnalysis,
            json!({ "analysis_id": analysis_id.into() }),
        )
    }

    #[must_use]
    pub fn unsubscribe_analysis(analysis_id: impl Into<String>) -> Self {
        Self::new(
            OutboundType::UnsubscribeAnalysis,
            json!({ "analysis_id": analysis_id.into() }),
        )
    }

    #[must_use]
    pub fn get_progress() -> Self {
        Self::new(OutboundType::GetProgress, json!({}))
    }

    #[must_use]
    pub fn get_current_status() -> Self {
        Self::new(OutboundType::GetCurrentStatus, json!({}))
    }

    /// `payload.analysis_id`, if the payload carries one
    #[must_use]
    pub fn analysis_id(&self) -> Option<&str> {
        self.payload.get("analysis_id").and_then(Value::as_str)
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutboundMessage(type={}, id={})", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_message() {
        let msg = OutboundMessage::ping();
        assert_eq!(msg.kind, OutboundType::Ping);
        assert_eq!(msg.payload, json!({}));
        assert!(msg.analysis_id().is_none());
    }

    #[test]
    fn test_subscribe_carries_analysis_id() {
        let msg = OutboundMessage::subscribe_analysis("a-42");
        assert_eq!(msg.kind, OutboundType::SubscribeAnalysis);
        assert_eq!(msg.analysis_id(), Some("a-42"));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(OutboundMessage::ping().id, OutboundMessage::ping().id);
    }

    #[test]
    fn test_type_serializes_as_wire_name() {
        let value = serde_json::to_value(OutboundMessage::get_current_status()).unwrap();
        assert_eq!(value["type"], "get_current_status");
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
    }
}
