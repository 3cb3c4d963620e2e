//! Analysis processing stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage reported by the analysis worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Initializing,
    Uploading,
    FrameExtraction,
    FeatureExtraction,
    ModelInference,
    PostProcessing,
    BlockchainSubmission,
    Completed,
    Failed,
}

impl AnalysisStage {
    /// Stages in pipeline order, excluding `Failed`
    pub const PIPELINE: [Self; 8] = [
        Self::Initializing,
        Self::Uploading,
        Self::FrameExtraction,
        Self::FeatureExtraction,
        Self::ModelInference,
        Self::PostProcessing,
        Self::BlockchainSubmission,
        Self::Completed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Uploading => "uploading",
            Self::FrameExtraction => "frame_extraction",
            Self::FeatureExtraction => "feature_extraction",
            Self::ModelInference => "model_inference",
            Self::PostProcessing => "post_processing",
            Self::BlockchainSubmission => "blockchain_submission",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// No further progress will be reported after a terminal stage
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the pipeline; `None` for `Failed`
    #[must_use]
    pub fn ordinal(self) -> Option<usize> {
        Self::PIPELINE.iter().position(|stage| *stage == self)
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
