//! Inbound events
//!
//! Payload structs for every discriminator the analysis endpoints emit.

mod event_types;
mod payloads;
mod stage;

pub use event_types::{EventKind, InboundEvent};
pub use payloads::{
    parse_timestamp, ConnectionEstablished, ErrorEvent, Heartbeat, HeartbeatKind, ProgressSample,
    ResultUpdate, StageTransition, StatusStreaming, StatusUpdate, SubscriptionConfirmed,
    SuspiciousRegion,
};
pub use stage::AnalysisStage;
