//! Task and file record data types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::ScoredAttempt;
use crate::preset::QualityPreset;

use super::status::{self, CurrentStep};

// ============================================================================
// Statuses
// ============================================================================

/// Processing status of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    Converting,
    Verifying,
    Completed,
    Failed,
    Downloaded,
    Removed,
}

impl FileStatus {
    /// No workflow stage will run for this file again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Downloaded | Self::Removed
        )
    }

    /// COMPLETED or one of its dispositions.
    pub fn is_completed_family(&self) -> bool {
        matches!(self, Self::Completed | Self::Downloaded | Self::Removed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Converting => "CONVERTING",
            Self::Verifying => "VERIFYING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Downloaded => "DOWNLOADED",
            Self::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => Self::Pending,
            "CONVERTING" => Self::Converting,
            "VERIFYING" => Self::Verifying,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "DOWNLOADED" => Self::Downloaded,
            "REMOVED" => Self::Removed,
            _ => return None,
        })
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a task, derived from its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Converting,
    Verifying,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyCompleted | Self::Failed | Self::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Converting => "CONVERTING",
            Self::Verifying => "VERIFYING",
            Self::Completed => "COMPLETED",
            Self::PartiallyCompleted => "PARTIALLY_COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => Self::Pending,
            "CONVERTING" => Self::Converting,
            "VERIFYING" => Self::Verifying,
            "COMPLETED" => Self::Completed,
            "PARTIALLY_COMPLETED" => Self::PartiallyCompleted,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            _ => return None,
        })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final disposition of a completed file, written by the cleanup protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Downloaded,
    Removed,
}

impl Disposition {
    pub fn status(&self) -> FileStatus {
        match self {
            Self::Downloaded => FileStatus::Downloaded,
            Self::Removed => FileStatus::Removed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Removed => "removed",
        }
    }
}

// ============================================================================
// File Record
// ============================================================================

/// One entry of a file's attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetAttempt {
    pub preset: QualityPreset,
    /// Similarity score once the attempt has been verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Score and preset of a verified attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub ssim_score: f64,
    pub preset: QualityPreset,
}

/// Everything recorded when a file is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub quality_result: QualityResult,
    pub best_effort: bool,
    pub output_key: String,
    pub output_size_bytes: u64,
    pub output_checksum: String,
    pub checksum_algorithm: String,
}

/// Size comparison between source and output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpaceSavings {
    pub original_size: u64,
    pub converted_size: u64,
    pub compression_ratio: f64,
    pub space_saved_bytes: i64,
    pub space_saved_percent: f64,
}

/// Per-file processing state within a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub filename: String,
    pub source_size_bytes: u64,
    pub status: FileStatus,
    /// Job id of the conversion currently running, if any. This is the
    /// `mediaconvert_job_id` of the file record data model; the engine behind
    /// [`TranscodeEngine`](crate::collaborator::TranscodeEngine) is pluggable.
    #[serde(default, alias = "mediaconvert_job_id")]
    pub transcode_job_id: Option<String>,
    /// Every preset actually tried, oldest first. Append-only.
    #[serde(default)]
    pub preset_attempts: Vec<PresetAttempt>,
    #[serde(default)]
    pub quality_result: Option<QualityResult>,
    #[serde(default)]
    pub best_effort: bool,
    /// Transient-failure retries consumed so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Last reported progress percentage; never decreases.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default)]
    pub output_size_bytes: Option<u64>,
    #[serde(default)]
    pub output_checksum: Option<String>,
    #[serde(default)]
    pub checksum_algorithm: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disposed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        source_size_bytes: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            source_size_bytes,
            status: FileStatus::Pending,
            transcode_job_id: None,
            preset_attempts: Vec::new(),
            quality_result: None,
            best_effort: false,
            retry_count: 0,
            progress: 0,
            error_code: None,
            error_message: None,
            output_key: None,
            output_size_bytes: None,
            output_checksum: None,
            checksum_algorithm: None,
            completed_at: None,
            disposed_at: None,
            updated_at: now,
        }
    }

    /// Preset of the attempt in progress (or the last one made).
    pub fn current_preset(&self) -> Option<QualityPreset> {
        self.preset_attempts.last().map(|attempt| attempt.preset)
    }

    /// Attempts that have been verified, in order.
    pub fn scored_attempts(&self) -> Vec<ScoredAttempt> {
        self.preset_attempts
            .iter()
            .filter_map(|attempt| attempt.score.map(|s| ScoredAttempt::new(attempt.preset, s)))
            .collect()
    }

    /// Presets tried so far, in order.
    pub fn presets_tried(&self) -> Vec<QualityPreset> {
        self.preset_attempts.iter().map(|a| a.preset).collect()
    }

    pub fn space_savings(&self) -> Option<SpaceSavings> {
        let converted = self.output_size_bytes?;
        let original = self.source_size_bytes;
        let saved = original as i64 - converted as i64;
        let (ratio, percent) = if original == 0 {
            (0.0, 0.0)
        } else {
            (
                converted as f64 / original as f64,
                saved as f64 * 100.0 / original as f64,
            )
        };
        Some(SpaceSavings {
            original_size: original,
            converted_size: converted,
            compression_ratio: (ratio * 1000.0).round() / 1000.0,
            space_saved_bytes: saved,
            space_saved_percent: (percent * 10.0).round() / 10.0,
        })
    }

    /// Apply a transition in place. The record is untouched on error.
    pub fn apply(
        &mut self,
        transition: &FileTransition,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !transition.allowed_from().contains(&self.status) {
            return Err(InvalidTransition {
                from: self.status,
                transition: transition.name(),
            });
        }

        match transition {
            FileTransition::BeginConversion { preset } => {
                self.status = FileStatus::Converting;
                self.preset_attempts.push(PresetAttempt {
                    preset: *preset,
                    score: None,
                });
                self.transcode_job_id = None;
                self.raise_progress(status::file_progress(FileStatus::Converting, None));
            }
            FileTransition::JobSubmitted { job_id } => {
                self.transcode_job_id = Some(job_id.clone());
            }
            FileTransition::JobProgress { percent } => {
                self.raise_progress(status::file_progress(
                    FileStatus::Converting,
                    Some(*percent),
                ));
            }
            FileTransition::BeginVerification => {
                self.status = FileStatus::Verifying;
                self.raise_progress(status::file_progress(FileStatus::Verifying, None));
            }
            FileTransition::AttemptScored { score } => {
                let Some(attempt) = self.preset_attempts.last_mut() else {
                    return Err(InvalidTransition {
                        from: self.status,
                        transition: transition.name(),
                    });
                };
                attempt.score = Some(*score);
                self.quality_result = Some(QualityResult {
                    ssim_score: *score,
                    preset: attempt.preset,
                });
            }
            FileTransition::TransientRetry { discard_job } => {
                self.retry_count += 1;
                if *discard_job {
                    self.transcode_job_id = None;
                }
            }
            FileTransition::Complete(record) => {
                self.status = FileStatus::Completed;
                self.quality_result = Some(record.quality_result);
                self.best_effort = record.best_effort;
                self.output_key = Some(record.output_key.clone());
                self.output_size_bytes = Some(record.output_size_bytes);
                self.output_checksum = Some(record.output_checksum.clone());
                self.checksum_algorithm = Some(record.checksum_algorithm.clone());
                self.transcode_job_id = None;
                self.completed_at = Some(now);
                self.raise_progress(100);
            }
            FileTransition::Fail { code, message } => {
                self.status = FileStatus::Failed;
                self.error_code = Some(code.clone());
                self.error_message = Some(message.clone());
                self.transcode_job_id = None;
                self.completed_at = Some(now);
                self.raise_progress(100);
            }
            FileTransition::Dispose(disposition) => {
                self.status = disposition.status();
                self.disposed_at = Some(now);
            }
        }

        self.updated_at = now;
        Ok(())
    }

    fn raise_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }
}

/// A requested mutation of a file record.
#[derive(Debug, Clone, PartialEq)]
pub enum FileTransition {
    /// Enter CONVERTING with a new attempt (PENDING, or VERIFYING on escalation).
    BeginConversion { preset: QualityPreset },
    /// Record the engine job id for the current attempt.
    JobSubmitted { job_id: String },
    /// External job progress, 0-100.
    JobProgress { percent: u8 },
    /// The conversion job finished; verification starts.
    BeginVerification,
    /// The current attempt has been scored.
    AttemptScored { score: f64 },
    /// A transient error consumed one retry; the stage runs again.
    TransientRetry { discard_job: bool },
    Complete(CompletionRecord),
    Fail { code: String, message: String },
    /// Cleanup marked the output as consumed or discarded.
    Dispose(Disposition),
}

impl FileTransition {
    pub fn allowed_from(&self) -> &'static [FileStatus] {
        use FileStatus::*;
        match self {
            Self::BeginConversion { .. } => &[Pending, Verifying],
            Self::JobSubmitted { .. } | Self::JobProgress { .. } | Self::BeginVerification => {
                &[Converting]
            }
            Self::AttemptScored { .. } | Self::Complete(_) => &[Verifying],
            Self::TransientRetry { .. } | Self::Fail { .. } => &[Converting, Verifying],
            Self::Dispose(_) => &[Completed],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BeginConversion { .. } => "begin_conversion",
            Self::JobSubmitted { .. } => "job_submitted",
            Self::JobProgress { .. } => "job_progress",
            Self::BeginVerification => "begin_verification",
            Self::AttemptScored { .. } => "attempt_scored",
            Self::TransientRetry { .. } => "transient_retry",
            Self::Complete(_) => "complete",
            Self::Fail { .. } => "fail",
            Self::Dispose(_) => "dispose",
        }
    }
}

/// A transition that is not permitted from the record's current status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transition {transition} is not allowed from {from}")]
pub struct InvalidTransition {
    pub from: FileStatus,
    pub transition: &'static str,
}

// ============================================================================
// Task
// ============================================================================

/// One batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub user_id: String,
    pub quality_preset: QualityPreset,
    /// Fixed at submission; only statuses change afterwards.
    pub files: Vec<FileRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// After this instant the task is unreadable and may be purged.
    pub expires_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        quality_preset: QualityPreset,
        files: Vec<FileRecord>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            quality_preset,
            files,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            expires_at: now + ttl,
        }
    }

    pub fn status(&self) -> TaskStatus {
        status::derive_task_status(
            self.files.iter().map(|f| f.status),
            self.cancelled_at.is_some(),
        )
    }

    pub fn progress_percentage(&self) -> u8 {
        status::aggregate_progress(self.files.iter().map(|f| f.progress))
    }

    pub fn current_step(&self) -> CurrentStep {
        status::current_step(self.files.iter().map(|f| f.status))
    }

    pub fn file(&self, file_id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.file_id == file_id)
    }

    pub fn completed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status.is_completed_family())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Failed)
            .count()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Rough completion estimate: ten minutes per wave of concurrent files.
    pub fn estimated_completion(
        &self,
        max_concurrent: usize,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if self.status().is_terminal() {
            return None;
        }
        let remaining = self.files.iter().filter(|f| !f.status.is_terminal()).count();
        let waves = remaining.div_ceil(max_concurrent.max(1));
        Some(now + Duration::seconds(waves as i64 * 600))
    }
}
