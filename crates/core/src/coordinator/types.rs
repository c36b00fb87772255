//! Types for the task coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::preset::QualityPreset;
use crate::storage::StorageError;
use crate::task::{
    CurrentStep, FileRecord, FileStatus, PresetAttempt, SpaceSavings, Task, TaskError, TaskStatus,
};

/// Errors returned by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The submission manifest was rejected; nothing was created.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown task, expired task, or a task owned by someone else.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// The task is not in a state that allows the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Task store error: {0}")]
    Store(TaskError),

    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),
}

impl From<TaskError> for CoordinatorError {
    fn from(e: TaskError) -> Self {
        if e.is_not_found() {
            Self::NotFound(e.to_string())
        } else if e.is_conflict() {
            Self::Conflict(e.to_string())
        } else {
            Self::Store(e)
        }
    }
}

/// One entry of a submission manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub file_size: u64,
}

/// A task submission: the files to convert and the requested preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub files: Vec<ManifestEntry>,
    /// Preset name; validated against the known presets.
    pub quality_preset: String,
}

/// Where the client uploads one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadHandle {
    pub file_id: String,
    pub filename: String,
    pub upload_url: String,
}

/// Response to a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub quality_preset: QualityPreset,
    pub uploads: Vec<UploadHandle>,
    /// When the upload URLs stop working.
    pub upload_expires_at: DateTime<Utc>,
}

/// Quality outcome of a completed file, with size savings.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub ssim_score: f64,
    pub preset: QualityPreset,
    pub best_effort: bool,
    #[serde(flatten)]
    pub savings: Option<SpaceSavings>,
}

/// Per-file part of a status response.
#[derive(Debug, Clone, Serialize)]
pub struct FileDetail {
    pub file_id: String,
    pub filename: String,
    pub status: FileStatus,
    pub progress: u8,
    pub source_size_bytes: u64,
    pub preset_attempts: Vec<PresetAttempt>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_result: Option<QualityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<String>,
    /// `null` unless the file is COMPLETED and not yet disposed of.
    pub download_url: Option<String>,
    pub download_expires_at: Option<DateTime<Utc>>,
    /// `null` unless the file FAILED.
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileDetail {
    pub fn from_record(file: &FileRecord) -> Self {
        Self {
            file_id: file.file_id.clone(),
            filename: file.filename.clone(),
            status: file.status,
            progress: file.progress,
            source_size_bytes: file.source_size_bytes,
            preset_attempts: file.preset_attempts.clone(),
            retry_count: file.retry_count,
            quality_result: file.quality_result.map(|q| QualityReport {
                ssim_score: q.ssim_score,
                preset: q.preset,
                best_effort: file.best_effort,
                savings: file.space_savings(),
            }),
            output_size_bytes: file.output_size_bytes,
            output_checksum: file.output_checksum.clone(),
            checksum_algorithm: file.checksum_algorithm.clone(),
            download_url: None,
            download_expires_at: None,
            error_code: file.error_code.clone(),
            error_message: file.error_message.clone(),
            completed_at: file.completed_at,
        }
    }
}

/// Full status of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task_id: String,
    pub status: TaskStatus,
    pub quality_preset: QualityPreset,
    pub progress_percentage: u8,
    pub current_step: CurrentStep,
    pub file_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub estimated_completion_time: Option<DateTime<Utc>>,
    pub files: Vec<FileDetail>,
}

/// Row of a task listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub quality_preset: QualityPreset,
    pub progress_percentage: u8,
    pub file_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            status: task.status(),
            quality_preset: task.quality_preset,
            progress_percentage: task.progress_percentage(),
            file_count: task.files.len(),
            completed_count: task.completed_count(),
            failed_count: task.failed_count(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Snapshot of the coordinator itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Whether the maintenance loop is running.
    pub running: bool,
    /// Tasks with live workflows in this process.
    pub active_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CompletionRecord, FileTransition, QualityResult};

    #[test]
    fn test_store_errors_map_to_coordinator_errors() {
        let err: CoordinatorError = TaskError::NotFound("t1".to_string()).into();
        assert!(matches!(err, CoordinatorError::NotFound(_)));

        let err: CoordinatorError = TaskError::InvalidState {
            task_id: "t1".to_string(),
            current_state: "started".to_string(),
            operation: "start".to_string(),
        }
        .into();
        assert!(matches!(err, CoordinatorError::Conflict(_)));

        let err: CoordinatorError = TaskError::Database("locked".to_string()).into();
        assert!(matches!(err, CoordinatorError::Store(_)));
    }

    #[test]
    fn test_file_detail_reports_savings() {
        let now = Utc::now();
        let mut file = FileRecord::new("f1", "clip.mov", 1_000, now);
        let steps = [
            FileTransition::BeginConversion {
                preset: QualityPreset::Balanced,
            },
            FileTransition::BeginVerification,
            FileTransition::AttemptScored { score: 0.97 },
            FileTransition::Complete(CompletionRecord {
                quality_result: QualityResult {
                    ssim_score: 0.97,
                    preset: QualityPreset::Balanced,
                },
                best_effort: false,
                output_key: "output/t1/f1/clip_h265.mp4".to_string(),
                output_size_bytes: 400,
                output_checksum: "abc".to_string(),
                checksum_algorithm: "SHA256".to_string(),
            }),
        ];
        for step in &steps {
            file.apply(step, now).unwrap();
        }

        let detail = FileDetail::from_record(&file);
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["quality_result"]["preset"], "balanced");
        assert_eq!(json["quality_result"]["original_size"], 1_000);
        assert_eq!(json["quality_result"]["converted_size"], 400);
        assert_eq!(json["quality_result"]["space_saved_bytes"], 600);
        assert_eq!(json.get("error_code"), Some(&serde_json::Value::Null));
        assert_eq!(json.get("error_message"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_pending_file_reports_null_download_and_error() {
        let file = FileRecord::new("f1", "clip.mov", 1_000, Utc::now());
        let json = serde_json::to_value(FileDetail::from_record(&file)).unwrap();

        assert_eq!(json["status"], "PENDING");
        for field in ["download_url", "download_expires_at", "error_code", "error_message"] {
            assert_eq!(json.get(field), Some(&serde_json::Value::Null), "{}", field);
        }
        assert!(json.get("quality_result").is_none());
    }
}
