//! File conversion workflows.
//!
//! One [`FileWorkflow`] runs per file: submit a transcode job for the
//! current preset, poll it, score the output, then either escalate to the
//! next preset or promote the accepted attempt. All progress lives in the
//! task store, so a workflow can be stopped at any await point and resumed
//! later from the persisted record.

mod config;
mod runner;
mod stop;
mod types;

pub use config::{RetryConfig, WorkflowConfig};
pub use runner::{FileWorkflow, WorkflowContext};
pub use stop::{StopHandle, StopReason, StopSignal};
pub use types::{
    codes, NoopObserver, OutputMetadata, TransitionObserver, WorkflowError, WorkflowOutcome,
};
