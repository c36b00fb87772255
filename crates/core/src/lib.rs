pub mod audit;
pub mod auth;
pub mod cleanup;
pub mod collaborator;
pub mod config;
pub mod coordinator;
pub mod escalation;
pub mod metrics;
pub mod preset;
pub mod storage;
pub mod task;
pub mod testing;
pub mod workflow;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use cleanup::{CleanupError, CleanupProtocol, CleanupResult};
pub use collaborator::{
    CollaboratorConfig, CollaboratorError, HttpQualityScorer, HttpTranscodeEngine, JobStatus,
    QualityScorer, TranscodeEngine, TranscodeRequest,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use coordinator::{
    CoordinatorConfig, CoordinatorError, RetentionConfig, SubmissionLimits, SubmitRequest,
    SubmitResponse, TaskCoordinator, TaskDetail, TaskSummary,
};
pub use escalation::{decide, Decision, ScoredAttempt};
pub use preset::{PresetPolicy, QualityPreset, SSIM_THRESHOLD};
pub use storage::{FsObjectStore, ObjectStore, StorageConfig, StorageError, UrlSigner};
pub use task::{
    Disposition, FileRecord, FileStatus, SqliteTaskStore, Task, TaskError, TaskStatus, TaskStore,
};
pub use workflow::{FileWorkflow, WorkflowConfig, WorkflowContext};
