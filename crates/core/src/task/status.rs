//! Derived task status, current step and progress.
//!
//! Everything here is a pure function of file statuses (and stored file
//! progress), so recomputing from the same snapshot always gives the same
//! answer.

use serde::{Deserialize, Serialize};

use super::types::{FileStatus, TaskStatus};

/// Progress reported for a CONVERTING file whose job progress is unknown.
pub const UNKNOWN_CONVERTING_PROGRESS: u8 = 15;

/// Upper bound of the CONVERTING progress band.
pub const CONVERTING_PROGRESS_CEILING: u8 = 30;

/// Progress reported while verifying.
pub const VERIFYING_PROGRESS: u8 = 65;

/// Stage label shown to clients, ordered pending < converting < verifying < completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStep {
    Pending,
    Converting,
    Verifying,
    Completed,
}

impl CurrentStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Converting => "converting",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
        }
    }

    fn of(status: FileStatus) -> Self {
        match status {
            FileStatus::Pending => Self::Pending,
            FileStatus::Converting => Self::Converting,
            FileStatus::Verifying => Self::Verifying,
            _ => Self::Completed,
        }
    }
}

/// Progress percentage for a file in `status`.
///
/// `job_percent` is the engine's own progress for the running conversion.
pub fn file_progress(status: FileStatus, job_percent: Option<u8>) -> u8 {
    match status {
        FileStatus::Pending => 0,
        FileStatus::Converting => match job_percent {
            Some(p) => (p.min(100) as u32 * CONVERTING_PROGRESS_CEILING as u32 / 100) as u8,
            None => UNKNOWN_CONVERTING_PROGRESS,
        },
        FileStatus::Verifying => VERIFYING_PROGRESS,
        FileStatus::Completed
        | FileStatus::Failed
        | FileStatus::Downloaded
        | FileStatus::Removed => 100,
    }
}

/// Integer mean of per-file progress, rounded down.
pub fn aggregate_progress<I>(progress: I) -> u8
where
    I: IntoIterator<Item = u8>,
{
    let (sum, count) = progress
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), p| (sum + p.min(100) as u64, count + 1));
    if count == 0 {
        return 0;
    }
    (sum / count) as u8
}

/// Minimum stage among in-flight files, or `Completed` when every file is terminal.
pub fn current_step<I>(statuses: I) -> CurrentStep
where
    I: IntoIterator<Item = FileStatus>,
{
    statuses
        .into_iter()
        .filter(|s| !s.is_terminal())
        .map(CurrentStep::of)
        .min()
        .unwrap_or(CurrentStep::Completed)
}

/// Task status from the multiset of file statuses.
///
/// `cancelled` is the task's cancellation marker, which is only ever set
/// while some file was still in flight.
pub fn derive_task_status<I>(statuses: I, cancelled: bool) -> TaskStatus
where
    I: IntoIterator<Item = FileStatus>,
{
    if cancelled {
        return TaskStatus::Cancelled;
    }

    let mut total = 0usize;
    let mut pending = 0usize;
    let mut converting = 0usize;
    let mut verifying = 0usize;
    let mut completed = 0usize;
    let mut failed = 0usize;

    for status in statuses {
        total += 1;
        match status {
            FileStatus::Pending => pending += 1,
            FileStatus::Converting => converting += 1,
            FileStatus::Verifying => verifying += 1,
            FileStatus::Failed => failed += 1,
            FileStatus::Completed | FileStatus::Downloaded | FileStatus::Removed => completed += 1,
        }
    }

    if total == 0 || pending == total {
        return TaskStatus::Pending;
    }

    if pending + converting + verifying == 0 {
        return match (completed, failed) {
            (_, 0) => TaskStatus::Completed,
            (0, _) => TaskStatus::Failed,
            _ => TaskStatus::PartiallyCompleted,
        };
    }

    // Work is under way: queued files count as converting.
    if pending > 0 || converting > 0 {
        TaskStatus::Converting
    } else {
        TaskStatus::Verifying
    }
}
