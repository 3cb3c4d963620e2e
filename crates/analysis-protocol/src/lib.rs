//! # analysis-protocol
//!
//! JSON-over-WebSocket protocol spoken by the analysis progress endpoints
//! (`/ws/analysis/{id}`, `/ws/status/{id}`).
//!
//! - [`events`]: inbound event payloads and their validation rules
//! - [`MessageCodec`]: frame decoding and outbound encoding
//! - [`OutboundMessage`]: client control messages
//! - [`CloseCode`]: close codes the server uses

pub mod codec;
pub mod events;

mod close_codes;
mod messages;

pub use close_codes::CloseCode;
pub use codec::{DecodeError, MessageCodec};
pub use events::{
    AnalysisStage, ConnectionEstablished, ErrorEvent, EventKind, Heartbeat, HeartbeatKind,
    InboundEvent, ProgressSample, ResultUpdate, StageTransition, StatusStreaming, StatusUpdate,
    SubscriptionConfirmed, SuspiciousRegion,
};
pub use messages::{OutboundMessage, OutboundType};
