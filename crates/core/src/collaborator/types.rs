//! Request and response types for external collaborators.

use serde::{Deserialize, Serialize};

use crate::preset::{EncoderSettings, QualityPreset};

/// Whether `score` is a usable SSIM value in `[0, 1]`.
pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (0.0..=1.0).contains(&score)
}

/// One conversion job request.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeRequest {
    pub task_id: String,
    pub file_id: String,
    pub source_key: String,
    pub output_key: String,
    pub preset: QualityPreset,
    pub settings: EncoderSettings,
}

/// State of a conversion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Progressing {
        /// Engine-reported progress, when known.
        #[serde(default)]
        percent: Option<u8>,
    },
    Complete,
    Failed {
        #[serde(default)]
        code: Option<i64>,
        message: String,
    },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed { .. })
    }
}
