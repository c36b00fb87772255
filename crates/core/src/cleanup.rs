//! Cleanup protocol.
//!
//! Once the client has consumed (downloaded) or discarded (removed) a
//! COMPLETED file, the record is moved to its final disposition first and
//! the output object deleted second. The record is authoritative: if the
//! status update fails nothing is deleted, and a failed delete is logged but
//! never reported to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::storage::{keys, ObjectStore};
use crate::task::{Disposition, FileRecord, FileStatus, FileTransition, TaskError, TaskStore};

/// Errors returned by [`CleanupProtocol::cleanup`].
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Unknown task or file, or a task owned by someone else.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The file is not COMPLETED, or was already disposed of differently.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Task store error: {0}")]
    Store(TaskError),
}

impl From<TaskError> for CleanupError {
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

/// Outcome of a successful cleanup call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub task_id: String,
    pub file_id: String,
    pub status: FileStatus,
    /// Whether this call removed the output object.
    pub object_deleted: bool,
    /// When the disposition was recorded.
    pub disposed_at: DateTime<Utc>,
}

/// Records a file's final disposition and deletes its output.
pub struct CleanupProtocol {
    store: Arc<dyn TaskStore>,
    objects: Arc<dyn ObjectStore>,
    audit: Option<AuditHandle>,
    delete_timeout: Duration,
}

impl CleanupProtocol {
    pub fn new(
        store: Arc<dyn TaskStore>,
        objects: Arc<dyn ObjectStore>,
        audit: Option<AuditHandle>,
        delete_timeout: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            audit,
            delete_timeout,
        }
    }

    /// Dispose of a completed file.
    ///
    /// Repeating the same disposition is a no-op success; asking for the
    /// other one is a conflict.
    pub async fn cleanup(
        &self,
        user_id: &str,
        task_id: &str,
        file_id: &str,
        action: Disposition,
    ) -> Result<CleanupResult, CleanupError> {
        let task = match self.store.get(task_id)? {
            Some(task) if task.user_id == user_id => task,
            _ => return Err(CleanupError::NotFound(format!("task {}", task_id))),
        };
        let file = task
            .file(file_id)
            .cloned()
            .ok_or_else(|| CleanupError::NotFound(format!("file {} in task {}", file_id, task_id)))?;

        if file.status == action.status() {
            return Ok(self.noop(task_id, &file, action));
        }

        let updated = match self.store.update_file(
            task_id,
            file_id,
            FileStatus::Completed,
            FileTransition::Dispose(action),
        ) {
            Ok(task) => task,
            // A concurrent identical request got there first.
            Err(TaskError::PreconditionFailed { actual, .. }) if actual == action.status() => {
                let file = self.reload(task_id, file_id)?;
                return Ok(self.noop(task_id, &file, action));
            }
            Err(e) => {
                metrics::CLEANUP_REQUESTS
                    .with_label_values(&[action.as_str(), "rejected"])
                    .inc();
                return Err(e.into());
            }
        };

        let disposed_at = updated
            .file(file_id)
            .and_then(|f| f.disposed_at)
            .unwrap_or_else(Utc::now);

        let output_key = file
            .output_key
            .clone()
            .unwrap_or_else(|| keys::output_key(task_id, file_id, &file.filename));
        let (object_deleted, result) =
            match timeout(self.delete_timeout, self.objects.delete(&output_key)).await {
                Ok(Ok(true)) => (true, "deleted"),
                Ok(Ok(false)) => {
                    warn!("Output {} was already gone", output_key);
                    (false, "missing")
                }
                Ok(Err(e)) => {
                    warn!("Failed to delete output {}: {}", output_key, e);
                    (false, "delete_failed")
                }
                Err(_) => {
                    warn!("Timed out deleting output {}", output_key);
                    (false, "delete_failed")
                }
            };

        metrics::CLEANUP_REQUESTS
            .with_label_values(&[action.as_str(), result])
            .inc();
        info!(
            "File {}/{} marked {} by {} (output deleted: {})",
            task_id,
            file_id,
            action.status(),
            user_id,
            object_deleted
        );

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::FileCleanedUp {
                    task_id: task_id.to_string(),
                    file_id: file_id.to_string(),
                    user_id: user_id.to_string(),
                    action: action.as_str().to_string(),
                    object_deleted,
                })
                .await;
        }

        Ok(CleanupResult {
            task_id: task_id.to_string(),
            file_id: file_id.to_string(),
            status: action.status(),
            object_deleted,
            disposed_at,
        })
    }

    fn reload(&self, task_id: &str, file_id: &str) -> Result<FileRecord, CleanupError> {
        self.store
            .get(task_id)?
            .and_then(|task| task.file(file_id).cloned())
            .ok_or_else(|| CleanupError::NotFound(format!("file {} in task {}", file_id, task_id)))
    }

    fn noop(&self, task_id: &str, file: &FileRecord, action: Disposition) -> CleanupResult {
        metrics::CLEANUP_REQUESTS
            .with_label_values(&[action.as_str(), "noop"])
            .inc();
        CleanupResult {
            task_id: task_id.to_string(),
            file_id: file.file_id.clone(),
            status: file.status,
            object_deleted: false,
            disposed_at: file.disposed_at.unwrap_or(file.updated_at),
        }
    }
}
