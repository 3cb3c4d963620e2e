//! Folded view of one analysis

use crate::connection::ConnectionState;
use analysis_common::ClientError;
use analysis_protocol::{AnalysisStage, ErrorEvent, InboundEvent, ResultUpdate};
use serde::Serialize;

/// Everything a consumer usually renders about one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisProgress {
    pub analysis_id: String,
    pub stage: Option<AnalysisStage>,
    /// Overall progress in [0, 1]
    pub progress: f64,
    pub message: Option<String>,
    pub frames_processed: Option<u64>,
    pub total_frames: Option<u64>,
    pub result: Option<ResultUpdate>,
    /// Last error reported by the server for this analysis
    pub last_error: Option<ErrorEvent>,
    pub connection: ConnectionState,
    /// Last error raised by the connection itself
    #[serde(skip)]
    pub connection_error: Option<ClientError>,
    pub completed: bool,
    pub failed: bool,
}

impl AnalysisProgress {
    #[must_use]
    pub fn new(analysis_id: impl Into<String>) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            stage: None,
            progress: 0.0,
            message: None,
            frames_processed: None,
            total_frames: None,
            result: None,
            last_error: None,
            connection: ConnectionState::Disconnected,
            connection_error: None,
            completed: false,
            failed: false,
        }
    }

    /// Nothing more will be reported for this analysis
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed || self.failed
    }

    /// Fold one event in; returns whether anything changed
    ///
    /// Events for other analyses are ignored.
    pub fn apply(&mut self, event: &InboundEvent) -> bool {
        if let Some(id) = event.analysis_id() {
            if id != self.analysis_id {
                return false;
            }
        }

        let before = self.clone();
        match event {
            InboundEvent::StatusUpdate(update) => {
                self.advance(update.current_stage, Some(update.progress));
                self.set_message(update.message.as_ref().or(update.error.as_ref()));
                self.set_frames(update.frames_processed, update.total_frames);
            }
            InboundEvent::StatusStreaming(status) => {
                self.advance(status.current_stage, Some(status.overall_progress));
                self.set_message(status.message.as_ref());
                self.set_frames(status.frames_processed, status.total_frames);
            }
            InboundEvent::StageTransition(transition) => {
                self.advance(transition.to_stage, transition.overall_progress);
                self.set_message(transition.message.as_ref());
            }
            InboundEvent::ResultUpdate(result) => {
                self.advance(AnalysisStage::Completed, Some(1.0));
                self.set_frames(Some(result.frames_processed), Some(result.total_frames));
                self.result = Some(result.clone());
            }
            InboundEvent::Error(error) => {
                if !error.recoverable {
                    self.advance(AnalysisStage::Failed, None);
                }
                self.message = Some(error.error_message.clone());
                self.last_error = Some(error.clone());
            }
            InboundEvent::Heartbeat(_)
            | InboundEvent::ConnectionEstablished(_)
            | InboundEvent::SubscriptionConfirmed(_) => return false,
        }
        *self != before
    }

    pub(crate) fn set_connection(&mut self, state: ConnectionState) -> bool {
        if self.connection == state {
            return false;
        }
        self.connection = state;
        if state.is_connected() {
            self.connection_error = None;
        }
        true
    }

    /// Move forward only; `Failed` is accepted from anywhere
    fn advance(&mut self, stage: AnalysisStage, progress: Option<f64>) {
        if self.failed {
            return;
        }

        if stage == AnalysisStage::Failed {
            self.stage = Some(stage);
            self.failed = true;
            if let Some(progress) = progress {
                self.progress = progress;
            }
            return;
        }

        let forward = match (self.stage.and_then(AnalysisStage::ordinal), stage.ordinal()) {
            (Some(current), Some(next)) => next >= current,
            _ => true,
        };
        if forward {
            self.stage = Some(stage);
        }
        if let Some(progress) = progress {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
        if stage == AnalysisStage::Completed {
            self.completed = true;
            self.progress = 1.0;
        }
    }

    fn set_message(&mut self, message: Option<&String>) {
        if let Some(message) = message {
            self.message = Some(message.clone());
        }
    }

    fn set_frames(&mut self, processed: Option<u64>, total: Option<u64>) {
        if let Some(total) = total {
            self.total_frames = Some(total);
        }
        if let Some(processed) = processed {
            let current = self.frames_processed.unwrap_or(0);
            self.frames_processed = Some(current.max(processed));
        }
    }
}
