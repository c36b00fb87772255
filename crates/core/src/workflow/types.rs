//! Workflow types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{FileStatus, FileTransition, PresetAttempt, QualityResult, Task, TaskError};

use super::stop::StopReason;

/// Error codes recorded on FAILED files.
pub mod codes {
    /// The source object was never uploaded or has disappeared.
    pub const SOURCE_NOT_FOUND: &str = "SOURCE_NOT_FOUND";
    /// The transcoding engine rejected or failed the job.
    pub const TRANSCODE_FAILED: &str = "TRANSCODE_FAILED";
    /// The scorer could not score the output.
    pub const QUALITY_CHECK_FAILED: &str = "QUALITY_CHECK_FAILED";
    /// The accepted output could not be stored.
    pub const OUTPUT_FAILED: &str = "OUTPUT_FAILED";
    /// Transient errors used up the retry budget.
    pub const RETRY_EXHAUSTED: &str = "RETRY_EXHAUSTED";
    /// The record is inconsistent with the workflow.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Completed { best_effort: bool },
    Failed { code: String },
    /// Stopped before reaching a terminal status.
    Stopped(StopReason),
    /// The file was already terminal when the run started.
    AlreadyFinished(FileStatus),
}

impl WorkflowOutcome {
    /// Label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { best_effort: false } => "completed",
            Self::Completed { best_effort: true } => "best_effort",
            Self::Failed { .. } => "failed",
            Self::Stopped(_) => "stopped",
            Self::AlreadyFinished(_) => "already_finished",
        }
    }
}

/// Errors that abort a workflow run without a terminal file status.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Task store error: {0}")]
    Store(#[from] TaskError),

    #[error("File {file_id} not found in task {task_id}")]
    FileMissing { task_id: String, file_id: String },

    /// A stage failed while the file was in a status that cannot record it.
    #[error("Unhandled failure in {status} stage: {message}")]
    Unhandled { status: FileStatus, message: String },
}

/// Receives every file transition together with the task snapshot taken
/// in the same store transaction.
pub trait TransitionObserver: Send + Sync {
    fn on_transition(
        &self,
        task: &Task,
        file_id: &str,
        from: FileStatus,
        transition: &FileTransition,
    );
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl TransitionObserver for NoopObserver {
    fn on_transition(&self, _: &Task, _: &str, _: FileStatus, _: &FileTransition) {}
}

/// JSON document written under the metadata key when a file completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub task_id: String,
    pub file_id: String,
    pub filename: String,
    pub source_size_bytes: u64,
    pub output_key: String,
    pub output_size_bytes: u64,
    pub output_checksum: String,
    pub checksum_algorithm: String,
    pub quality_result: QualityResult,
    pub best_effort: bool,
    pub preset_attempts: Vec<PresetAttempt>,
    pub completed_at: DateTime<Utc>,
}
