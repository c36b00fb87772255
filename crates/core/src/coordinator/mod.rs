//! Task coordinator.
//!
//! Turns a submission manifest into a task of PENDING file records, runs one
//! [`FileWorkflow`](crate::workflow::FileWorkflow) per file under a per-task
//! concurrency limit, and answers status queries from the stored records.
//! Task status is never stored; [`TaskTracker`] watches file transitions and
//! reports when the derived status moves.

mod config;
mod runner;
mod tracker;
mod types;
mod validation;

pub use config::{CoordinatorConfig, RetentionConfig, SubmissionLimits};
pub use runner::{TaskCoordinator, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use tracker::{status_before, TaskTracker};
pub use types::{
    CoordinatorError, CoordinatorStatus, FileDetail, ManifestEntry, QualityReport, SubmitRequest,
    SubmitResponse, TaskDetail, TaskSummary, UploadHandle,
};
pub use validation::{validate_submission, MAX_FILENAME_LEN};
