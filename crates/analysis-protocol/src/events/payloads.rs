//! Inbound event payloads
//!
//! Each struct is the fully validated body of one discriminator. Timestamps
//! stay as the server's ISO-8601 strings; [`parse_timestamp`] converts them.

use super::AnalysisStage;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// Progress update for an analysis task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_status_update_frames"))]
pub struct StatusUpdate {
    #[validate(length(min = 1, message = "analysis_id cannot be empty"))]
    pub analysis_id: String,

    /// Worker task identifier
    #[serde(default)]
    pub task_id: Option<String>,

    #[validate(range(min = 0.0, max = 1.0, message = "progress must be within [0, 1]"))]
    pub progress: f64,

    pub current_stage: AnalysisStage,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub estimated_completion: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub frames_processed: Option<u64>,

    #[serde(default)]
    pub total_frames: Option<u64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub processing_speed_fps: Option<f64>,

    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

/// Region of a frame flagged by the detector, in normalized coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SuspiciousRegion {
    pub frame_number: u64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub x: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub y: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub width: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub height: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f64,

    #[serde(default)]
    pub region_type: Option<String>,
}

/// Final verdict for a completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_result_frames"))]
pub struct ResultUpdate {
    #[validate(length(min = 1, message = "analysis_id cannot be empty"))]
    pub analysis_id: String,

    #[validate(range(min = 0.0, max = 1.0, message = "confidence_score must be within [0, 1]"))]
    pub confidence_score: f64,

    pub is_fake: bool,

    pub frames_processed: u64,

    pub total_frames: u64,

    #[serde(default)]
    #[validate(nested)]
    pub suspicious_regions: Vec<SuspiciousRegion>,

    #[serde(default)]
    #[validate(custom(function = "validate_hex_hash"))]
    pub blockchain_hash: Option<String>,

    #[validate(range(min = 0.0))]
    pub processing_time_ms: f64,

    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

/// Server-reported failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ErrorEvent {
    #[serde(default)]
    pub analysis_id: Option<String>,

    #[validate(length(min = 1, message = "error_code cannot be empty"))]
    pub error_code: String,

    pub error_message: String,

    #[serde(default)]
    pub error_details: Option<Map<String, Value>>,

    /// Whether the analysis may still finish
    #[serde(default)]
    pub recoverable: bool,

    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

/// Body of a heartbeat frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatKind {
    #[default]
    Ping,
    Pong,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Heartbeat {
    #[serde(default)]
    pub message: HeartbeatKind,

    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
}

impl Heartbeat {
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.message == HeartbeatKind::Pong
    }
}

/// Greeting sent by the server once the socket is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ConnectionEstablished {
    #[serde(default)]
    pub analysis_id: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
}

/// Move from one pipeline stage to the next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StageTransition {
    #[validate(length(min = 1, message = "analysis_id cannot be empty"))]
    pub analysis_id: String,

    #[serde(default)]
    pub from_stage: Option<AnalysisStage>,

    pub to_stage: AnalysisStage,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub overall_progress: Option<f64>,

    /// Seconds spent in `from_stage`
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub previous_stage_duration: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub estimated_stage_duration: Option<f64>,

    #[serde(default)]
    pub message: Option<String>,

    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

/// One point of the progress history carried by streaming updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProgressSample {
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,

    #[validate(range(min = 0.0, max = 1.0))]
    pub overall_progress: f64,

    pub stage: AnalysisStage,
}

/// Detailed streaming status with resource metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_streaming_frames"))]
pub struct StatusStreaming {
    #[validate(length(min = 1, message = "analysis_id cannot be empty"))]
    pub analysis_id: String,

    pub current_stage: AnalysisStage,

    #[validate(range(min = 0.0, max = 1.0))]
    pub stage_progress: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub overall_progress: f64,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub frames_processed: Option<u64>,

    #[serde(default)]
    pub total_frames: Option<u64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub processing_rate_fps: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub cpu_usage_percent: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub memory_usage_mb: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub processing_efficiency: Option<f64>,

    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub estimated_completion: Option<String>,

    #[serde(default)]
    pub error_recovery_status: Option<Value>,

    #[serde(default)]
    #[validate(nested)]
    pub progress_history: Vec<ProgressSample>,

    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: String,
}

/// Acknowledgement of a `subscribe_analysis` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SubscriptionConfirmed {
    #[validate(length(min = 1, message = "analysis_id cannot be empty"))]
    pub analysis_id: String,

    #[serde(default)]
    #[validate(custom(function = "validate_timestamp"))]
    pub timestamp: Option<String>,
}

/// Parse a server timestamp: RFC 3339, or a naive ISO-8601 datetime taken as UTC
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn validate_timestamp(value: &str) -> Result<(), ValidationError> {
    if parse_timestamp(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("timestamp")
            .with_message(Cow::Owned(format!("'{value}' is not an ISO-8601 timestamp"))))
    }
}

fn validate_hex_hash(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if trimmed.is_empty() || (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())) {
        Ok(())
    } else {
        Err(ValidationError::new("hex")
            .with_message(Cow::Borrowed("blockchain_hash must be a hexadecimal string")))
    }
}

fn check_frame_counts(processed: Option<u64>, total: Option<u64>) -> Result<(), ValidationError> {
    match (processed, total) {
        (Some(processed), Some(total)) if processed > total => Err(ValidationError::new("frames")
            .with_message(Cow::Owned(format!(
                "frames_processed ({processed}) exceeds total_frames ({total})"
            )))),
        _ => Ok(()),
    }
}

fn validate_status_update_frames(event: &StatusUpdate) -> Result<(), ValidationError> {
    check_frame_counts(event.frames_processed, event.total_frames)
}

fn validate_result_frames(event: &ResultUpdate) -> Result<(), ValidationError> {
    check_frame_counts(Some(event.frames_processed), Some(event.total_frames))
}

fn validate_streaming_frames(event: &StatusStreaming) -> Result<(), ValidationError> {
    check_frame_counts(event.frames_processed, event.total_frames)
}
