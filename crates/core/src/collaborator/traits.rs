//! Trait definitions for external collaborators.

use async_trait::async_trait;

use super::error::CollaboratorError;
use super::types::{JobStatus, TranscodeRequest};

/// Remote transcoding engine.
///
/// Jobs are opaque: the engine reads the source key and writes the output
/// key itself.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Returns the name of this engine.
    fn name(&self) -> &str;

    /// Submit a job. Returns the engine's job id.
    async fn submit(&self, request: &TranscodeRequest) -> Result<String, CollaboratorError>;

    /// Current state of a previously submitted job.
    async fn poll(&self, job_id: &str) -> Result<JobStatus, CollaboratorError>;
}

/// Perceptual quality scorer.
#[async_trait]
pub trait QualityScorer: Send + Sync {
    /// Returns the name of this scorer.
    fn name(&self) -> &str;

    /// Similarity of `output_key` to `source_key`, in [0, 1].
    async fn score(&self, source_key: &str, output_key: &str) -> Result<f64, CollaboratorError>;
}
