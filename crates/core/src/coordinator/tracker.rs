//! Task status tracking.
//!
//! Every file transition arrives here with the task snapshot written in the
//! same store transaction. The derived task status before the transition is
//! recomputed from that snapshot with the file put back in its old status,
//! so status changes are detected without reading the store again.

use tracing::info;

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::task::{derive_task_status, FileStatus, FileTransition, Task, TaskStatus};
use crate::workflow::TransitionObserver;

/// Records file and task status changes in the audit trail and metrics.
pub struct TaskTracker {
    audit: Option<AuditHandle>,
}

impl TaskTracker {
    pub fn new(audit: Option<AuditHandle>) -> Self {
        Self { audit }
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.try_emit(event);
        }
    }
}

/// Task status as it was before `file_id` left `from`.
pub fn status_before(task: &Task, file_id: &str, from: FileStatus) -> TaskStatus {
    derive_task_status(
        task.files
            .iter()
            .map(|f| if f.file_id == file_id { from } else { f.status }),
        task.cancelled_at.is_some(),
    )
}

impl TransitionObserver for TaskTracker {
    fn on_transition(
        &self,
        task: &Task,
        file_id: &str,
        from: FileStatus,
        transition: &FileTransition,
    ) {
        let Some(file) = task.file(file_id) else {
            return;
        };

        if file.status != from {
            self.emit(AuditEvent::FileTransitioned {
                task_id: task.task_id.clone(),
                file_id: file_id.to_string(),
                from_status: from.as_str().to_string(),
                to_status: file.status.as_str().to_string(),
                preset: file.current_preset().map(|p| p.as_str().to_string()),
                error_code: file.error_code.clone(),
            });
        }

        if let (FileStatus::Verifying, FileTransition::BeginConversion { preset }) =
            (from, transition)
        {
            let previous = file
                .preset_attempts
                .len()
                .checked_sub(2)
                .and_then(|i| file.preset_attempts.get(i));
            if let Some(previous) = previous {
                self.emit(AuditEvent::FileEscalated {
                    task_id: task.task_id.clone(),
                    file_id: file_id.to_string(),
                    from_preset: previous.preset.as_str().to_string(),
                    to_preset: preset.as_str().to_string(),
                    score: previous.score.unwrap_or_default(),
                });
            }
        }

        let before = status_before(task, file_id, from);
        let after = task.status();
        if before == after {
            return;
        }

        info!("Task {} is now {} (was {})", task.task_id, after, before);
        self.emit(AuditEvent::TaskStatusChanged {
            task_id: task.task_id.clone(),
            from_status: before.as_str().to_string(),
            to_status: after.as_str().to_string(),
        });
        if after.is_terminal() {
            let label = after.as_str().to_lowercase();
            metrics::TASKS_FINISHED
                .with_label_values(&[label.as_str()])
                .inc();
        }
    }
}
