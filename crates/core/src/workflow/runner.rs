//! Per-file workflow.
//!
//! A [`FileWorkflow`] drives one file from PENDING to COMPLETED or FAILED.
//! Every step reloads the file record and dispatches on its persisted
//! status, so a workflow started on a half-processed record (after a
//! restart) picks up where the previous run stopped: a CONVERTING file
//! with a job id resumes polling that job, a VERIFYING file with a scored
//! attempt goes straight to the escalation decision.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::collaborator::{
    is_valid_score, CollaboratorError, JobStatus, QualityScorer, TranscodeEngine,
    TranscodeRequest,
};
use crate::escalation::{decide, Decision, ScoredAttempt};
use crate::metrics;
use crate::preset::{PresetPolicy, QualityPreset};
use crate::storage::{keys, ObjectStore, StorageError};
use crate::task::{
    file_progress, CompletionRecord, FileRecord, FileStatus, FileTransition, QualityResult, Task,
    TaskError, TaskStore,
};

use super::config::WorkflowConfig;
use super::stop::{StopReason, StopSignal};
use super::types::{codes, OutputMetadata, TransitionObserver, WorkflowError, WorkflowOutcome};

/// Collaborators shared by every workflow.
#[derive(Clone)]
pub struct WorkflowContext {
    pub store: Arc<dyn TaskStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub engine: Arc<dyn TranscodeEngine>,
    pub scorer: Arc<dyn QualityScorer>,
    pub observer: Arc<dyn TransitionObserver>,
    pub config: WorkflowConfig,
}

/// A stage that could not finish.
struct StageFailure {
    retryable: bool,
    /// The running job is unusable; a retry must submit a new one.
    discard_job: bool,
    code: Option<&'static str>,
    message: String,
}

impl StageFailure {
    fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            discard_job: false,
            code: None,
            message: message.into(),
        }
    }

    fn permanent(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            discard_job: false,
            code: Some(code),
            message: message.into(),
        }
    }

    fn discarding_job(mut self) -> Self {
        self.discard_job = true;
        self
    }
}

enum StepError {
    Stopped(StopReason),
    Store(TaskError),
    Failed(StageFailure),
}

impl StepError {
    /// Attach a failure code unless one is already set.
    fn or_code(self, code: &'static str) -> Self {
        match self {
            Self::Failed(mut failure) => {
                failure.code.get_or_insert(code);
                Self::Failed(failure)
            }
            other => other,
        }
    }
}

impl From<StageFailure> for StepError {
    fn from(failure: StageFailure) -> Self {
        Self::Failed(failure)
    }
}

impl From<CollaboratorError> for StepError {
    fn from(e: CollaboratorError) -> Self {
        Self::Failed(StageFailure {
            retryable: e.is_retryable(),
            discard_job: false,
            code: None,
            message: e.to_string(),
        })
    }
}

impl From<StorageError> for StepError {
    fn from(e: StorageError) -> Self {
        Self::Failed(StageFailure {
            retryable: e.is_retryable(),
            discard_job: false,
            code: None,
            message: e.to_string(),
        })
    }
}

impl From<TaskError> for StepError {
    fn from(e: TaskError) -> Self {
        Self::Store(e)
    }
}

impl From<StopReason> for StepError {
    fn from(reason: StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result of one stage: `Some` once the file reached a terminal status.
type Step = Result<Option<WorkflowOutcome>, StepError>;

/// Drives one file through conversion, verification and escalation.
pub struct FileWorkflow {
    ctx: WorkflowContext,
    task_id: String,
    file_id: String,
    filename: String,
    source_key: String,
    policy: PresetPolicy,
    stop: StopSignal,
}

impl FileWorkflow {
    pub fn new(ctx: WorkflowContext, task: &Task, file: &FileRecord, stop: StopSignal) -> Self {
        Self {
            task_id: task.task_id.clone(),
            file_id: file.file_id.clone(),
            filename: file.filename.clone(),
            source_key: keys::source_key(&task.task_id, &file.file_id, &file.filename),
            policy: PresetPolicy::for_preset(task.quality_preset),
            ctx,
            stop,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Run until the file is terminal or the stop signal fires.
    pub async fn run(self) -> Result<WorkflowOutcome, WorkflowError> {
        let started = Instant::now();
        let result = self.drive().await;

        if let Ok(outcome @ (WorkflowOutcome::Completed { .. } | WorkflowOutcome::Failed { .. })) =
            &result
        {
            metrics::FILES_FINISHED
                .with_label_values(&[outcome.label()])
                .inc();
            metrics::FILE_DURATION
                .with_label_values(&[outcome.label()])
                .observe(started.elapsed().as_secs_f64());
        }

        result
    }

    async fn drive(&self) -> Result<WorkflowOutcome, WorkflowError> {
        loop {
            if let Some(reason) = self.stop.reason() {
                return Ok(WorkflowOutcome::Stopped(reason));
            }

            let file = match self.load() {
                Ok(file) => file,
                Err(TaskError::FileNotFound { task_id, file_id }) => {
                    return Err(WorkflowError::FileMissing { task_id, file_id })
                }
                Err(e) => return Err(e.into()),
            };

            let step = match file.status {
                FileStatus::Pending => self.begin().await,
                FileStatus::Converting => self.convert(&file).await,
                FileStatus::Verifying => self.verify(&file).await,
                status => return Ok(WorkflowOutcome::AlreadyFinished(status)),
            };

            let step = match step {
                Err(StepError::Failed(failure)) => self.handle_failure(file.status, failure).await,
                other => other,
            };

            match step {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => continue,
                Err(StepError::Stopped(reason)) => {
                    debug!(
                        "Workflow for {}/{} stopped ({:?})",
                        self.task_id, self.file_id, reason
                    );
                    return Ok(WorkflowOutcome::Stopped(reason));
                }
                Err(StepError::Store(e)) => {
                    // A write racing a cancel is rejected by the store.
                    if let Some(reason) = self.stop.reason() {
                        return Ok(WorkflowOutcome::Stopped(reason));
                    }
                    return Err(e.into());
                }
                Err(StepError::Failed(failure)) => {
                    return Err(WorkflowError::Unhandled {
                        status: file.status,
                        message: failure.message,
                    })
                }
            }
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn begin(&self) -> Step {
        let preset = self.policy.first_preset();
        self.transition(FileStatus::Pending, FileTransition::BeginConversion { preset })?;
        info!(
            "Starting conversion of {}/{} ({}) with preset {}",
            self.task_id, self.file_id, self.filename, preset
        );
        Ok(None)
    }

    async fn convert(&self, file: &FileRecord) -> Step {
        let Some(preset) = file.current_preset() else {
            return Err(StageFailure::permanent(
                codes::INTERNAL_ERROR,
                "converting file has no preset attempt",
            )
            .into());
        };

        let job_id = match &file.transcode_job_id {
            Some(job_id) => {
                debug!(
                    "Resuming transcode job {} for {}/{}",
                    job_id, self.task_id, self.file_id
                );
                job_id.clone()
            }
            None => self.submit(preset).await?,
        };

        let deadline = Instant::now() + self.ctx.config.transcode_timeout();
        let mut reported = file.progress;

        loop {
            let status = self
                .call(
                    self.ctx.config.request_timeout(),
                    "transcode poll",
                    self.ctx.engine.poll(&job_id),
                )
                .await?;

            match status {
                JobStatus::Queued | JobStatus::Progressing { percent: None } => {}
                JobStatus::Progressing {
                    percent: Some(percent),
                } => {
                    if file_progress(FileStatus::Converting, Some(percent)) > reported {
                        let task = self
                            .transition(FileStatus::Converting, FileTransition::JobProgress { percent })?;
                        reported = self.file_in(&task)?.progress;
                    }
                }
                JobStatus::Complete => {
                    self.transition(FileStatus::Converting, FileTransition::BeginVerification)?;
                    info!(
                        "Transcode job {} finished for {}/{}, verifying",
                        job_id, self.task_id, self.file_id
                    );
                    return Ok(None);
                }
                JobStatus::Failed { code, message } => {
                    let error = CollaboratorError::from_engine_code(code, message);
                    return Err(StageFailure {
                        retryable: error.is_retryable(),
                        discard_job: true,
                        code: Some(codes::TRANSCODE_FAILED),
                        message: error.to_string(),
                    }
                    .into());
                }
            }

            if Instant::now() >= deadline {
                return Err(StageFailure::transient(format!(
                    "transcode job {} did not finish within {}s",
                    job_id, self.ctx.config.transcode_timeout_secs
                ))
                .discarding_job()
                .into());
            }

            self.stop.sleep(self.ctx.config.poll_interval()).await?;
        }
    }

    /// Check the source and submit a job for `preset`, recording its id.
    async fn submit(&self, preset: QualityPreset) -> Result<String, StepError> {
        let source = self
            .call(
                self.ctx.config.storage_timeout(),
                "source lookup",
                self.ctx.objects.head(&self.source_key),
            )
            .await?;
        if source.is_none() {
            return Err(StageFailure::permanent(
                codes::SOURCE_NOT_FOUND,
                format!("source object {} not found", self.source_key),
            )
            .into());
        }

        let Some(settings) = preset.encoder_settings() else {
            return Err(StageFailure::permanent(
                codes::INTERNAL_ERROR,
                format!("preset {} has no encoder settings", preset),
            )
            .into());
        };

        let request = TranscodeRequest {
            task_id: self.task_id.clone(),
            file_id: self.file_id.clone(),
            source_key: self.source_key.clone(),
            output_key: keys::attempt_output_key(
                &self.task_id,
                &self.file_id,
                &self.filename,
                preset,
            ),
            preset,
            settings,
        };

        let job_id = self
            .call(
                self.ctx.config.request_timeout(),
                "transcode submit",
                self.ctx.engine.submit(&request),
            )
            .await?;

        self.transition(
            FileStatus::Converting,
            FileTransition::JobSubmitted {
                job_id: job_id.clone(),
            },
        )?;
        info!(
            "Submitted transcode job {} for {}/{} with preset {}",
            job_id, self.task_id, self.file_id, preset
        );

        Ok(job_id)
    }

    async fn verify(&self, file: &FileRecord) -> Step {
        let Some(last) = file.preset_attempts.last().cloned() else {
            return Err(StageFailure::permanent(
                codes::INTERNAL_ERROR,
                "verifying file has no preset attempt",
            )
            .into());
        };

        let mut current = file.clone();
        if last.score.is_none() {
            let output_key =
                keys::attempt_output_key(&self.task_id, &self.file_id, &self.filename, last.preset);
            let score = self
                .call(
                    self.ctx.config.score_timeout(),
                    "quality scoring",
                    self.ctx.scorer.score(&self.source_key, &output_key),
                )
                .await?;
            if !is_valid_score(score) {
                return Err(StageFailure::permanent(
                    codes::QUALITY_CHECK_FAILED,
                    format!("scorer returned {} for preset {}", score, last.preset),
                )
                .into());
            }

            metrics::QUALITY_SCORES
                .with_label_values(&[last.preset.as_str()])
                .observe(score);
            let task = self.transition(FileStatus::Verifying, FileTransition::AttemptScored { score })?;
            current = self.file_in(&task)?;
            info!(
                "File {}/{} scored {:.4} with preset {}",
                self.task_id, self.file_id, score, last.preset
            );
        }

        match decide(&self.policy, &current.scored_attempts()) {
            Decision::Retry(next) => {
                self.transition(
                    FileStatus::Verifying,
                    FileTransition::BeginConversion { preset: next },
                )?;
                metrics::ESCALATIONS
                    .with_label_values(&[next.as_str()])
                    .inc();
                info!(
                    "Escalating {}/{} from {} to {}",
                    self.task_id, self.file_id, last.preset, next
                );
                Ok(None)
            }
            Decision::Accept {
                attempt,
                best_effort,
            } => self.accept(&current, attempt, best_effort).await.map(Some),
        }
    }

    /// Promote the accepted attempt to the output key and complete the file.
    async fn accept(
        &self,
        file: &FileRecord,
        attempt: ScoredAttempt,
        best_effort: bool,
    ) -> Result<WorkflowOutcome, StepError> {
        let limit = self.ctx.config.storage_timeout();
        let staged =
            keys::attempt_output_key(&self.task_id, &self.file_id, &self.filename, attempt.preset);
        let output_key = keys::output_key(&self.task_id, &self.file_id, &self.filename);

        self.call(limit, "output copy", self.ctx.objects.copy(&staged, &output_key))
            .await
            .map_err(|e| e.or_code(codes::OUTPUT_FAILED))?;

        let meta = self
            .call(limit, "output lookup", self.ctx.objects.head(&output_key))
            .await
            .map_err(|e| e.or_code(codes::OUTPUT_FAILED))?
            .ok_or_else(|| {
                StageFailure::permanent(
                    codes::OUTPUT_FAILED,
                    format!("output object {} missing after copy", output_key),
                )
            })?;

        let quality_result = QualityResult {
            ssim_score: attempt.score,
            preset: attempt.preset,
        };
        let checksum_algorithm = meta.checksum_algorithm.as_str().to_string();

        let metadata = OutputMetadata {
            task_id: self.task_id.clone(),
            file_id: self.file_id.clone(),
            filename: self.filename.clone(),
            source_size_bytes: file.source_size_bytes,
            output_key: output_key.clone(),
            output_size_bytes: meta.size_bytes,
            output_checksum: meta.checksum.clone(),
            checksum_algorithm: checksum_algorithm.clone(),
            quality_result,
            best_effort,
            preset_attempts: file.preset_attempts.clone(),
            completed_at: Utc::now(),
        };
        let document = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| StageFailure::permanent(codes::OUTPUT_FAILED, e.to_string()))?;
        let metadata_key = keys::metadata_key(&self.task_id, &self.file_id, &self.filename);
        self.call(limit, "metadata write", self.ctx.objects.put(&metadata_key, document))
            .await
            .map_err(|e| e.or_code(codes::OUTPUT_FAILED))?;

        let record = CompletionRecord {
            quality_result,
            best_effort,
            output_key,
            output_size_bytes: meta.size_bytes,
            output_checksum: meta.checksum,
            checksum_algorithm,
        };
        let task = self.transition(FileStatus::Verifying, FileTransition::Complete(record))?;

        info!(
            "File {}/{} completed with preset {} (score {:.4}{})",
            self.task_id,
            self.file_id,
            attempt.preset,
            attempt.score,
            if best_effort { ", best effort" } else { "" }
        );

        self.release_objects(&self.file_in(&task)?).await;
        Ok(WorkflowOutcome::Completed { best_effort })
    }

    // =========================================================================
    // Failure handling
    // =========================================================================

    /// Retry a transient failure within budget, otherwise fail the file.
    async fn handle_failure(&self, stage: FileStatus, failure: StageFailure) -> Step {
        if !matches!(stage, FileStatus::Converting | FileStatus::Verifying) {
            return Err(StepError::Failed(failure));
        }

        let file = self.load()?;
        if file.status != stage {
            // Someone else moved the record; reload and dispatch again.
            return Ok(None);
        }

        let budget = self.ctx.config.retry.max_attempts;
        if failure.retryable && file.retry_count < budget {
            let delay = self.ctx.config.retry.delay_for(file.retry_count);
            warn!(
                "Transient failure for {}/{} while {} (retry {}/{} in {:?}): {}",
                self.task_id,
                self.file_id,
                stage,
                file.retry_count + 1,
                budget,
                delay,
                failure.message
            );
            self.transition(
                stage,
                FileTransition::TransientRetry {
                    discard_job: failure.discard_job,
                },
            )?;
            let label = stage.as_str().to_lowercase();
            metrics::TRANSIENT_RETRIES
                .with_label_values(&[label.as_str()])
                .inc();
            self.stop.sleep(delay).await?;
            return Ok(None);
        }

        let code = if failure.retryable {
            codes::RETRY_EXHAUSTED
        } else {
            failure.code.unwrap_or(match stage {
                FileStatus::Verifying => codes::QUALITY_CHECK_FAILED,
                _ => codes::TRANSCODE_FAILED,
            })
        };

        warn!(
            "File {}/{} failed with {}: {}",
            self.task_id, self.file_id, code, failure.message
        );
        let task = self.transition(
            stage,
            FileTransition::Fail {
                code: code.to_string(),
                message: failure.message,
            },
        )?;

        self.release_objects(&self.file_in(&task)?).await;
        Ok(Some(WorkflowOutcome::Failed {
            code: code.to_string(),
        }))
    }

    /// Delete staged attempts and the source once the file is terminal.
    ///
    /// Failures are logged only; the record is already final.
    async fn release_objects(&self, file: &FileRecord) {
        let mut doomed: Vec<String> = Vec::new();
        for preset in file.presets_tried() {
            let key = keys::attempt_output_key(&self.task_id, &self.file_id, &self.filename, preset);
            if !doomed.contains(&key) {
                doomed.push(key);
            }
        }
        doomed.push(self.source_key.clone());

        let limit = self.ctx.config.storage_timeout();
        for key in doomed {
            match timeout(limit, self.ctx.objects.delete(&key)).await {
                Ok(Ok(_)) => debug!("Deleted {}", key),
                Ok(Err(e)) => warn!("Failed to delete {}: {}", key, e),
                Err(_) => warn!("Timed out deleting {}", key),
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn load(&self) -> Result<FileRecord, TaskError> {
        let task = self
            .ctx
            .store
            .get(&self.task_id)?
            .ok_or_else(|| TaskError::NotFound(self.task_id.clone()))?;
        self.file_in(&task)
    }

    fn file_in(&self, task: &Task) -> Result<FileRecord, TaskError> {
        task.file(&self.file_id)
            .cloned()
            .ok_or_else(|| TaskError::FileNotFound {
                task_id: self.task_id.clone(),
                file_id: self.file_id.clone(),
            })
    }

    /// Conditionally apply a transition and notify the observer.
    ///
    /// Nothing is written once the stop signal has fired.
    fn transition(
        &self,
        expected: FileStatus,
        transition: FileTransition,
    ) -> Result<Task, StepError> {
        if let Some(reason) = self.stop.reason() {
            return Err(StepError::Stopped(reason));
        }
        let task = self.ctx.store.update_file(
            &self.task_id,
            &self.file_id,
            expected,
            transition.clone(),
        )?;
        self.ctx
            .observer
            .on_transition(&task, &self.file_id, expected, &transition);
        Ok(task)
    }

    /// Await a collaborator call under a time limit and the stop signal.
    async fn call<T, E, F>(&self, limit: Duration, what: &str, fut: F) -> Result<T, StepError>
    where
        F: Future<Output = Result<T, E>>,
        StepError: From<E>,
    {
        match self.stop.guard(timeout(limit, fut)).await? {
            Ok(result) => result.map_err(StepError::from),
            Err(_) => Err(StageFailure::transient(format!(
                "{} timed out after {}s",
                what,
                limit.as_secs()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SqliteTaskStore;
    use crate::testing::{fixtures, MemoryObjectStore, MockQualityScorer, MockTranscodeEngine};
    use crate::workflow::{NoopObserver, RetryConfig, StopHandle};

    struct Harness {
        store: Arc<SqliteTaskStore>,
        objects: MemoryObjectStore,
        engine: MockTranscodeEngine,
        scorer: MockQualityScorer,
        ctx: WorkflowContext,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let objects = MemoryObjectStore::new();
        let engine = MockTranscodeEngine::new(objects.clone());
        let scorer = MockQualityScorer::new();
        let config = WorkflowConfig::default()
            .with_poll_interval_ms(5)
            .with_retry(RetryConfig::immediate(3));

        let ctx = WorkflowContext {
            store: store.clone(),
            objects: Arc::new(objects.clone()),
            engine: Arc::new(engine.clone()),
            scorer: Arc::new(scorer.clone()),
            observer: Arc::new(NoopObserver),
            config,
        };

        Harness {
            store,
            objects,
            engine,
            scorer,
            ctx,
        }
    }

    async fn submit(h: &Harness, preset: QualityPreset) -> Task {
        let task = fixtures::task("t1", "alice", preset, 1);
        h.store.create(&task).unwrap();
        fixtures::upload_sources(&h.objects, &task).await;
        task
    }

    async fn run(h: &Harness, task: &Task) -> WorkflowOutcome {
        FileWorkflow::new(h.ctx.clone(), task, &task.files[0], StopSignal::never())
            .run()
            .await
            .unwrap()
    }

    fn file(h: &Harness) -> FileRecord {
        h.store.get("t1").unwrap().unwrap().files[0].clone()
    }

    #[tokio::test]
    async fn test_fixed_preset_completes() {
        let h = harness();
        let task = submit(&h, QualityPreset::Balanced).await;

        let outcome = run(&h, &task).await;
        assert_eq!(outcome, WorkflowOutcome::Completed { best_effort: false });

        let file = file(&h);
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.presets_tried(), vec![QualityPreset::Balanced]);
        assert_eq!(file.output_key.as_deref(), Some("output/t1/f1/clip-1_h265.mp4"));
        assert_eq!(file.output_size_bytes, Some(400));
        assert_eq!(file.progress, 100);

        let keys = h.objects.keys().await;
        assert_eq!(
            keys,
            vec![
                "output/t1/f1/clip-1_h265.mp4".to_string(),
                "tasks/t1/metadata/f1/clip-1.mov.json".to_string(),
            ]
        );

        let metadata: OutputMetadata = serde_json::from_slice(
            &h.objects
                .get("tasks/t1/metadata/f1/clip-1.mov.json")
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(metadata.output_size_bytes, 400);
        assert_eq!(metadata.quality_result.preset, QualityPreset::Balanced);
    }

    #[tokio::test]
    async fn test_fixed_preset_never_escalates() {
        let h = harness();
        h.scorer.set_score(QualityPreset::Compression, 0.80).await;
        let task = submit(&h, QualityPreset::Compression).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: false }
        );
        assert_eq!(h.engine.submit_count().await, 1);
        assert_eq!(file(&h).quality_result.unwrap().ssim_score, 0.80);
    }

    #[tokio::test]
    async fn test_adaptive_escalation_accepts_second_rung() {
        let h = harness();
        h.scorer.set_score(QualityPreset::Balanced, 0.91).await;
        h.scorer.set_score(QualityPreset::High, 0.96).await;
        let task = submit(&h, QualityPreset::BalancedPlus).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: false }
        );

        let file = file(&h);
        assert_eq!(
            file.presets_tried(),
            vec![QualityPreset::Balanced, QualityPreset::High]
        );
        assert_eq!(file.quality_result.unwrap().preset, QualityPreset::High);
        assert_eq!(file.output_size_bytes, Some(600));
        assert!(!file.best_effort);
        assert_eq!(
            h.engine.presets_for("f1").await,
            vec![QualityPreset::Balanced, QualityPreset::High]
        );
    }

    #[tokio::test]
    async fn test_exhausted_ladder_is_best_effort() {
        let h = harness();
        h.scorer.set_score(QualityPreset::Balanced, 0.93).await;
        h.scorer.set_score(QualityPreset::High, 0.92).await;
        let task = submit(&h, QualityPreset::BalancedPlus).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: true }
        );

        let file = file(&h);
        assert!(file.best_effort);
        let result = file.quality_result.unwrap();
        assert_eq!(result.preset, QualityPreset::Balanced);
        assert_eq!(result.ssim_score, 0.93);
        // The balanced attempt was promoted, not the last one.
        assert_eq!(file.output_size_bytes, Some(400));
    }

    #[tokio::test]
    async fn test_transient_engine_failure_is_retried() {
        let h = harness();
        h.engine
            .push_final_status(JobStatus::Failed {
                code: Some(1517),
                message: "throttled".to_string(),
            })
            .await;
        let task = submit(&h, QualityPreset::Balanced).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: false }
        );

        let file = file(&h);
        assert_eq!(file.retry_count, 1);
        assert_eq!(file.presets_tried(), vec![QualityPreset::Balanced]);
        assert_eq!(h.engine.submit_count().await, 2);
    }

    #[tokio::test]
    async fn test_permanent_engine_failure_fails_file() {
        let h = harness();
        h.engine
            .push_final_status(JobStatus::Failed {
                code: Some(1010),
                message: "unsupported input".to_string(),
            })
            .await;
        let task = submit(&h, QualityPreset::High).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Failed {
                code: codes::TRANSCODE_FAILED.to_string()
            }
        );

        let file = file(&h);
        assert_eq!(file.status, FileStatus::Failed);
        assert_eq!(file.retry_count, 0);
        assert!(file.error_message.unwrap().contains("unsupported input"));
        // Source and staged attempt are gone.
        assert!(h.objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let h = harness();
        for _ in 0..4 {
            h.engine
                .push_poll_error(CollaboratorError::transient("connection reset"))
                .await;
        }
        let task = submit(&h, QualityPreset::Balanced).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Failed {
                code: codes::RETRY_EXHAUSTED.to_string()
            }
        );
        let file = file(&h);
        assert_eq!(file.retry_count, 3);
        assert_eq!(file.error_code.as_deref(), Some(codes::RETRY_EXHAUSTED));
        // Poll errors keep the job.
        assert_eq!(h.engine.submit_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_retry() {
        let h = harness();
        let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 1);
        h.store.create(&task).unwrap();

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Failed {
                code: codes::SOURCE_NOT_FOUND.to_string()
            }
        );
        assert_eq!(h.engine.submit_count().await, 0);
        assert_eq!(file(&h).retry_count, 0);
    }

    #[tokio::test]
    async fn test_scorer_error_is_quality_check_failure() {
        let h = harness();
        h.scorer
            .push_error(CollaboratorError::permanent("corrupt output"))
            .await;
        let task = submit(&h, QualityPreset::Balanced).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Failed {
                code: codes::QUALITY_CHECK_FAILED.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unusable_score_fails_file_and_keeps_record_readable() {
        for bad in [f64::NAN, f64::INFINITY, 1.5, -0.1] {
            let h = harness();
            h.scorer.set_score(QualityPreset::Balanced, bad).await;
            let task = submit(&h, QualityPreset::Balanced).await;

            assert_eq!(
                run(&h, &task).await,
                WorkflowOutcome::Failed {
                    code: codes::QUALITY_CHECK_FAILED.to_string()
                }
            );
            let record = file(&h);
            assert_eq!(record.status, FileStatus::Failed);
            assert!(record.preset_attempts.iter().all(|a| a.score.is_none()));
        }
    }

    #[tokio::test]
    async fn test_progress_is_recorded() {
        let h = harness();
        h.engine
            .set_progress(vec![
                JobStatus::Queued,
                JobStatus::Progressing { percent: Some(50) },
                JobStatus::Progressing { percent: Some(40) },
            ])
            .await;
        let task = submit(&h, QualityPreset::Balanced).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: false }
        );
        assert_eq!(h.engine.poll_count().await, 4);
    }

    #[tokio::test]
    async fn test_resume_polls_existing_job() {
        let h = harness();
        let task = submit(&h, QualityPreset::Balanced).await;

        // A previous run got as far as submitting the job.
        let request = TranscodeRequest {
            task_id: "t1".to_string(),
            file_id: "f1".to_string(),
            source_key: keys::source_key("t1", "f1", "clip-1.mov"),
            output_key: keys::attempt_output_key("t1", "f1", "clip-1.mov", QualityPreset::Balanced),
            preset: QualityPreset::Balanced,
            settings: QualityPreset::Balanced.encoder_settings().unwrap(),
        };
        let job_id = h.engine.submit(&request).await.unwrap();
        h.store
            .update_file(
                "t1",
                "f1",
                FileStatus::Pending,
                FileTransition::BeginConversion {
                    preset: QualityPreset::Balanced,
                },
            )
            .unwrap();
        h.store
            .update_file(
                "t1",
                "f1",
                FileStatus::Converting,
                FileTransition::JobSubmitted { job_id },
            )
            .unwrap();

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::Completed { best_effort: false }
        );
        assert_eq!(h.engine.submit_count().await, 1);
    }

    #[tokio::test]
    async fn test_stop_leaves_record_in_flight() {
        let h = harness();
        h.engine.set_stalled(true).await;
        let task = submit(&h, QualityPreset::Balanced).await;

        let handle = StopHandle::new();
        let workflow = FileWorkflow::new(h.ctx.clone(), &task, &task.files[0], handle.signal());
        let running = tokio::spawn(workflow.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop(StopReason::Shutdown);

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome, WorkflowOutcome::Stopped(StopReason::Shutdown));

        let file = file(&h);
        assert_eq!(file.status, FileStatus::Converting);
        assert!(file.transcode_job_id.is_some());
    }

    #[tokio::test]
    async fn test_terminal_file_is_left_alone() {
        let h = harness();
        let task = submit(&h, QualityPreset::Balanced).await;
        run(&h, &task).await;

        assert_eq!(
            run(&h, &task).await,
            WorkflowOutcome::AlreadyFinished(FileStatus::Completed)
        );
        assert_eq!(h.engine.submit_count().await, 1);
    }
}
