//! Task storage trait and types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{FileStatus, FileTransition, Task, TaskStatus};

/// Error type for task store operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found (or expired).
    #[error("Task not found: {0}")]
    NotFound(String),

    /// File id not part of the task.
    #[error("File {file_id} not found in task {task_id}")]
    FileNotFound { task_id: String, file_id: String },

    /// Conditional update lost: the file was not in the expected status.
    #[error("File {file_id} in task {task_id} is {actual}, expected {expected}")]
    PreconditionFailed {
        task_id: String,
        file_id: String,
        expected: FileStatus,
        actual: FileStatus,
    },

    /// The transition is not permitted from the file's status.
    #[error("Cannot {transition} file {file_id}: current status is {from}")]
    InvalidTransition {
        file_id: String,
        from: FileStatus,
        transition: &'static str,
    },

    /// Task-level operation not permitted in the current state.
    #[error("Cannot {operation} task {task_id}: current state is {current_state}")]
    InvalidState {
        task_id: String,
        current_state: String,
        operation: String,
    },

    /// Task id already used.
    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TaskError {
    /// Whether the error means "the record is not in a state that allows this".
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed { .. }
                | Self::InvalidTransition { .. }
                | Self::InvalidState { .. }
                | Self::AlreadyExists(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::FileNotFound { .. })
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks owned by this user.
    pub user_id: Option<String>,
    /// Only tasks whose derived status matches.
    pub status: Option<TaskStatus>,
    /// Maximum number of results.
    pub limit: usize,
    /// Offset for pagination.
    pub offset: usize,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self {
            user_id: None,
            status: None,
            limit: 20,
            offset: 0,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable store for tasks and their file records.
///
/// The store is the single source of truth. File updates are conditional:
/// they only apply when the file is still in the status the caller observed.
pub trait TaskStore: Send + Sync {
    /// Persist a newly submitted task with all of its file records.
    fn create(&self, task: &Task) -> Result<(), TaskError>;

    /// Get a task by id. Expired tasks are reported as absent.
    fn get(&self, task_id: &str) -> Result<Option<Task>, TaskError>;

    /// List unexpired tasks, newest first.
    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError>;

    /// Apply `transition` to one file if its status is still `expected`.
    ///
    /// Returns a snapshot of the whole task taken inside the same
    /// transaction as the update.
    fn update_file(
        &self,
        task_id: &str,
        file_id: &str,
        expected: FileStatus,
        transition: FileTransition,
    ) -> Result<Task, TaskError>;

    /// Record that processing was started. Fails if it already was, or if
    /// the task was cancelled.
    fn mark_started(&self, task_id: &str) -> Result<Task, TaskError>;

    /// Record cancellation. Fails if the task is already terminal.
    fn mark_cancelled(&self, task_id: &str) -> Result<Task, TaskError>;

    /// Started, uncancelled, unexpired tasks that still have files in flight.
    fn list_resumable(&self) -> Result<Vec<Task>, TaskError>;

    /// Delete tasks that expired at or before `now`. Returns how many.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, TaskError>;
}
