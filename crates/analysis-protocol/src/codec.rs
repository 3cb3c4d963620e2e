//! Frame codec
//!
//! Turns raw text frames into validated [`InboundEvent`]s and outbound
//! messages into JSON text.
//!
//! The server emits two shapes for the same discriminator: payload fields at
//! the top level, or nested under `data` (`stage_data` for stage
//! transitions). Nested fields are merged over the top-level ones before the
//! payload is deserialized, so both decode to the same event.

use crate::events::{EventKind, InboundEvent};
use crate::messages::OutboundMessage;
use analysis_common::ClientError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use validator::Validate;

/// Discriminator fields, in lookup order
const DISCRIMINATORS: [&str; 2] = ["event_type", "type"];

/// Why a frame was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame is not a JSON object: {0}")]
    ParseFailure(String),

    #[error("Frame has no event_type or type field")]
    MissingDiscriminator,

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid {event_type} frame: {reason}")]
    Invalid { event_type: EventKind, reason: String },
}

impl DecodeError {
    /// The discriminator of the rejected frame, when it got that far
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        match self {
            Self::UnknownType(tag) => Some(tag),
            Self::Invalid { event_type, .. } => Some(event_type.as_str()),
            Self::ParseFailure(_) | Self::MissingDiscriminator => None,
        }
    }
}

impl From<DecodeError> for ClientError {
    fn from(err: DecodeError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Stateless JSON codec for the analysis protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Decode one text frame
    ///
    /// A frame either satisfies its variant's schema entirely or is rejected;
    /// no partially populated event is ever returned.
    pub fn decode(raw: &str) -> Result<InboundEvent, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::ParseFailure(e.to_string()))?;
        let Value::Object(frame) = value else {
            return Err(DecodeError::ParseFailure(format!(
                "expected an object, found {}",
                json_type_name(&value)
            )));
        };

        let tag = DISCRIMINATORS
            .iter()
            .find_map(|key| frame.get(*key).and_then(Value::as_str))
            .ok_or(DecodeError::MissingDiscriminator)?;

        // Bare `{"type": "pong"}` replies are heartbeats too
        if let Some(message) = bare_heartbeat(tag) {
            let mut payload = frame.clone();
            payload.insert("message".to_string(), Value::String(message.to_string()));
            return Ok(InboundEvent::Heartbeat(parse(EventKind::Heartbeat, payload)?));
        }

        let kind = EventKind::from_str(tag).ok_or_else(|| DecodeError::UnknownType(tag.to_string()))?;
        let payload = merge_payload(frame, kind);

        let event = match kind {
            EventKind::StatusUpdate => InboundEvent::StatusUpdate(parse(kind, payload)?),
            EventKind::ResultUpdate => InboundEvent::ResultUpdate(parse(kind, payload)?),
            EventKind::Error => InboundEvent::Error(parse(kind, payload)?),
            EventKind::Heartbeat => InboundEvent::Heartbeat(parse(kind, payload)?),
            EventKind::ConnectionEstablished => {
                InboundEvent::ConnectionEstablished(parse(kind, payload)?)
            }
            EventKind::StageTransition => InboundEvent::StageTransition(parse(kind, payload)?),
            EventKind::StatusStreaming => InboundEvent::StatusStreaming(parse(kind, payload)?),
            EventKind::SubscriptionConfirmed => {
                InboundEvent::SubscriptionConfirmed(parse(kind, payload)?)
            }
        };

        Ok(event)
    }

    /// Encode an outbound message as JSON text
    ///
    /// `payload.analysis_id` is mirrored at the top level, where the server
    /// reads it for subscription requests.
    pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(message)?;
        if let (Some(id), Value::Object(map)) = (message.analysis_id(), &mut value) {
            map.insert("analysis_id".to_string(), Value::String(id.to_string()));
        }
        serde_json::to_string(&value)
    }
}

fn bare_heartbeat(tag: &str) -> Option<&'static str> {
    match tag {
        "ping" => Some("ping"),
        "pong" => Some("pong"),
        _ => None,
    }
}

fn merge_payload(mut frame: Map<String, Value>, kind: EventKind) -> Map<String, Value> {
    let nested_keys: &[&str] = match kind {
        EventKind::StageTransition => &["data", "stage_data"],
        _ => &["data"],
    };

    for key in nested_keys {
        if let Some(Value::Object(nested)) = frame.remove(*key) {
            frame.extend(nested);
        }
    }
    frame
}

fn parse<T>(kind: EventKind, payload: Map<String, Value>) -> Result<T, DecodeError>
where
    T: DeserializeOwned + Validate,
{
    let event: T = serde_json::from_value(Value::Object(payload)).map_err(|e| DecodeError::Invalid {
        event_type: kind,
        reason: e.to_string(),
    })?;
    event.validate().map_err(|e| DecodeError::Invalid {
        event_type: kind,
        reason: e.to_string(),
    })?;
    Ok(event)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
