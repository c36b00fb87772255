//! External collaborators: the transcoding engine and the quality scorer.
//!
//! Both are opaque services. This module defines the traits the workflow
//! drives them through, the classification of their failures into
//! transient and permanent, and reqwest-based HTTP clients.

mod config;
mod error;
mod http;
mod traits;
mod types;

pub use config::CollaboratorConfig;
pub use error::{
    CollaboratorError, ErrorCategory, INPUT_ENGINE_CODES, PERMISSION_ENGINE_CODES,
    TRANSIENT_ENGINE_CODES,
};
pub use http::{HttpQualityScorer, HttpTranscodeEngine};
pub use traits::{QualityScorer, TranscodeEngine};
pub use types::{is_valid_score, JobStatus, TranscodeRequest};
