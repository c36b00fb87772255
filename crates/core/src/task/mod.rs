//! Task and file records.
//!
//! A task is one batch submission; each of its files moves through the
//! PENDING → CONVERTING → VERIFYING → COMPLETED/FAILED lifecycle. Task
//! status, progress and current step are never stored: they are derived
//! from the file records every time they are read.

mod sqlite_store;
mod status;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use status::{
    aggregate_progress, current_step, derive_task_status, file_progress, CurrentStep,
    CONVERTING_PROGRESS_CEILING, UNKNOWN_CONVERTING_PROGRESS, VERIFYING_PROGRESS,
};
pub use store::{TaskError, TaskFilter, TaskStore};
pub use types::{
    CompletionRecord, Disposition, FileRecord, FileStatus, FileTransition, InvalidTransition,
    PresetAttempt, QualityResult, SpaceSavings, Task, TaskStatus,
};
