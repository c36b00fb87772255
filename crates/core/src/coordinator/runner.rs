//! Task coordinator implementation.
//!
//! Owns the task lifecycle around the per-file workflows:
//! - Submission: validate the manifest, create PENDING records, hand out upload URLs
//! - Start/resume: fan a task out into file workflows behind a per-task semaphore
//! - Cancellation: mark the task and stop its workflows cooperatively
//! - Maintenance: purge expired tasks in the background

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::collaborator::{QualityScorer, TranscodeEngine};
use crate::metrics;
use crate::storage::{keys, ObjectStore};
use crate::task::{FileRecord, FileStatus, Task, TaskFilter, TaskStatus, TaskStore};
use crate::workflow::{FileWorkflow, StopHandle, StopReason, WorkflowContext, WorkflowOutcome};

use super::config::{CoordinatorConfig, RetentionConfig, SubmissionLimits};
use super::tracker::TaskTracker;
use super::types::{
    CoordinatorError, CoordinatorStatus, FileDetail, SubmitRequest, SubmitResponse, TaskDetail,
    TaskSummary, UploadHandle,
};
use super::validation::validate_submission;

/// Default and maximum page size for task listings.
pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// Workflows of one task running in this process.
struct ActiveTask {
    stop: StopHandle,
    join: JoinHandle<()>,
}

/// Fans tasks out into file workflows and tracks their aggregate state.
pub struct TaskCoordinator {
    config: CoordinatorConfig,
    limits: SubmissionLimits,
    retention: RetentionConfig,
    store: Arc<dyn TaskStore>,
    objects: Arc<dyn ObjectStore>,
    context: WorkflowContext,
    audit: Option<AuditHandle>,

    // Runtime state
    running: Arc<AtomicBool>,
    active: Arc<RwLock<HashMap<String, ActiveTask>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoordinatorConfig,
        limits: SubmissionLimits,
        retention: RetentionConfig,
        store: Arc<dyn TaskStore>,
        objects: Arc<dyn ObjectStore>,
        engine: Arc<dyn TranscodeEngine>,
        scorer: Arc<dyn QualityScorer>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let context = WorkflowContext {
            store: Arc::clone(&store),
            objects: Arc::clone(&objects),
            engine,
            scorer,
            observer: Arc::new(TaskTracker::new(audit.clone())),
            config: config.workflow.clone(),
        };

        Self {
            config,
            limits,
            retention,
            store,
            objects,
            context,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    // =========================================================================
    // Client operations
    // =========================================================================

    /// Validate a manifest and create a PENDING task with one upload URL per file.
    ///
    /// Nothing is stored when any entry is rejected.
    pub async fn submit(
        &self,
        user_id: &str,
        request: SubmitRequest,
    ) -> Result<SubmitResponse, CoordinatorError> {
        let preset = validate_submission(&request, &self.limits)?;

        // Task columns keep microseconds.
        let now = Utc::now().trunc_subsecs(6);
        let task_id = uuid::Uuid::new_v4().to_string();
        let files: Vec<FileRecord> = request
            .files
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                FileRecord::new(format!("f{}", i + 1), &entry.filename, entry.file_size, now)
            })
            .collect();

        let ttl = self.config.upload_url_ttl();
        let mut uploads = Vec::with_capacity(files.len());
        let mut upload_expires_at = now + ttl;
        for file in &files {
            let key = keys::source_key(&task_id, &file.file_id, &file.filename);
            let url = self.objects.upload_url(&key, ttl)?;
            upload_expires_at = url.expires_at;
            uploads.push(UploadHandle {
                file_id: file.file_id.clone(),
                filename: file.filename.clone(),
                upload_url: url.url,
            });
        }

        let task = Task::new(
            &task_id,
            user_id,
            preset,
            files,
            now,
            self.retention.task_ttl(),
        );
        self.store.create(&task)?;

        let total_size_bytes: u64 = task.files.iter().map(|f| f.source_size_bytes).sum();
        metrics::TASKS_SUBMITTED
            .with_label_values(&[preset.as_str()])
            .inc();
        metrics::FILES_SUBMITTED.inc_by(task.files.len() as u64);
        info!(
            "Task {} submitted by {}: {} files, {} bytes, preset {}",
            task_id,
            user_id,
            task.files.len(),
            total_size_bytes,
            preset
        );

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskSubmitted {
                    task_id: task_id.clone(),
                    user_id: user_id.to_string(),
                    quality_preset: preset.as_str().to_string(),
                    file_count: task.files.len(),
                    total_size_bytes,
                })
                .await;
        }

        Ok(SubmitResponse {
            task_id,
            status: task.status(),
            quality_preset: preset,
            uploads,
            upload_expires_at,
        })
    }

    /// Begin processing a submitted task. Starting twice is a conflict.
    pub async fn start(&self, user_id: &str, task_id: &str) -> Result<TaskDetail, CoordinatorError> {
        self.owned_task(user_id, task_id)?;
        let task = self.store.mark_started(task_id)?;
        info!("Task {} started by {}", task_id, user_id);

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskStarted {
                    task_id: task_id.to_string(),
                    user_id: user_id.to_string(),
                })
                .await;
        }

        self.launch(task).await;
        self.status(user_id, task_id)
    }

    /// Current state of one task, with download URLs for completed files.
    pub fn status(&self, user_id: &str, task_id: &str) -> Result<TaskDetail, CoordinatorError> {
        let task = self.owned_task(user_id, task_id)?;
        Ok(self.detail(&task))
    }

    /// The caller's tasks, newest first.
    pub fn list(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<TaskSummary>, CoordinatorError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let mut filter = TaskFilter::new().with_user_id(user_id).with_limit(limit);
        if let Some(status) = status {
            filter = filter.with_status(status);
        }

        let tasks = self.store.list(&filter)?;
        Ok(tasks.iter().map(TaskSummary::from).collect())
    }

    /// Cancel a task that has not finished yet.
    ///
    /// File records are left as they are; running workflows stop at their
    /// next await point without writing anything further.
    pub async fn cancel(&self, user_id: &str, task_id: &str) -> Result<TaskDetail, CoordinatorError> {
        let previous = self.owned_task(user_id, task_id)?.status();
        let task = self.store.mark_cancelled(task_id)?;

        if let Some(active) = self.active.read().await.get(task_id) {
            active.stop.stop(StopReason::Cancelled);
        }

        metrics::TASKS_FINISHED
            .with_label_values(&["cancelled"])
            .inc();
        info!("Task {} cancelled by {} (was {})", task_id, user_id, previous);

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::TaskCancelled {
                    task_id: task_id.to_string(),
                    cancelled_by: user_id.to_string(),
                    previous_status: previous.as_str().to_string(),
                })
                .await;
        }

        Ok(self.detail(&task))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Relaunch workflows for tasks interrupted by a restart.
    pub async fn resume(&self) -> Result<usize, CoordinatorError> {
        let tasks = self.store.list_resumable()?;
        let mut resumed = 0;

        for task in tasks {
            if self.active.read().await.contains_key(&task.task_id) {
                continue;
            }
            let pending = task.files.iter().filter(|f| !f.status.is_terminal()).count();
            if pending == 0 {
                continue;
            }
            info!(
                "Resuming task {} with {} unfinished files",
                task.task_id, pending
            );
            self.launch(task).await;
            resumed += 1;
        }

        if resumed > 0 {
            info!("Resumed {} tasks", resumed);
        }
        Ok(resumed)
    }

    /// Delete tasks whose retention window has passed.
    pub async fn purge_expired(&self) -> Result<usize, CoordinatorError> {
        let purged = self.store.purge_expired(Utc::now())?;
        if purged > 0 {
            metrics::TASKS_PURGED.inc_by(purged as u64);
            info!("Purged {} expired tasks", purged);
            if let Some(ref audit) = self.audit {
                audit.emit(AuditEvent::TasksPurged { count: purged }).await;
            }
        }
        Ok(purged)
    }

    /// Spawn the background purge loop.
    pub fn spawn_maintenance(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Coordinator maintenance already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let store = Arc::clone(&self.store);
        let audit = self.audit.clone();
        let interval = self.config.purge_interval();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Maintenance loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Maintenance loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        match store.purge_expired(Utc::now()) {
                            Ok(0) => debug!("No expired tasks to purge"),
                            Ok(purged) => {
                                metrics::TASKS_PURGED.inc_by(purged as u64);
                                info!("Purged {} expired tasks", purged);
                                if let Some(ref audit) = audit {
                                    audit.emit(AuditEvent::TasksPurged { count: purged }).await;
                                }
                            }
                            Err(e) => warn!("Purge failed: {}", e),
                        }
                    }
                }
            }
            info!("Maintenance loop stopped");
        });
    }

    /// Stop every workflow and the maintenance loop, then wait for the
    /// workflows to wind down. Their records stay resumable.
    pub async fn shutdown(&self) {
        info!("Stopping task coordinator");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<(String, ActiveTask)> = self.active.write().await.drain().collect();
        for (_, task) in &tasks {
            task.stop.stop(StopReason::Shutdown);
        }
        for (task_id, task) in tasks {
            if let Err(e) = task.join.await {
                error!("Workflows of task {} panicked: {}", task_id, e);
            }
        }

        info!("Task coordinator stopped");
    }

    pub async fn coordinator_status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            running: self.running.load(Ordering::Relaxed),
            active_tasks: self.active.read().await.len(),
        }
    }

    /// Whether workflows of `task_id` are still running in this process.
    pub async fn is_active(&self, task_id: &str) -> bool {
        self.active.read().await.contains_key(task_id)
    }

    /// Wait until the workflows of `task_id` have all returned.
    pub async fn wait_idle(&self, task_id: &str) {
        loop {
            if !self.is_active(task_id).await {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Spawn one workflow per unfinished file, at most
    /// `max_concurrent_files` of them past PENDING at a time.
    async fn launch(&self, task: Task) {
        let stop = StopHandle::new();
        let slots = Arc::new(Semaphore::new(self.config.max_concurrent_files.max(1)));
        let task_id = task.task_id.clone();

        let workflows: Vec<_> = task
            .files
            .iter()
            .filter(|f| !f.status.is_terminal())
            .map(|file| {
                let workflow =
                    FileWorkflow::new(self.context.clone(), &task, file, stop.signal());
                let signal = stop.signal();
                let slots = Arc::clone(&slots);
                let task_id = task_id.clone();

                async move {
                    let _permit = match signal.guard(slots.acquire_owned()).await {
                        Ok(Ok(permit)) => permit,
                        _ => return,
                    };

                    metrics::ACTIVE_WORKFLOWS.inc();
                    let file_id = workflow.file_id().to_string();
                    match workflow.run().await {
                        Ok(WorkflowOutcome::Stopped(reason)) => {
                            debug!("Workflow {}/{} stopped ({:?})", task_id, file_id, reason)
                        }
                        Ok(outcome) => {
                            debug!("Workflow {}/{} finished: {:?}", task_id, file_id, outcome)
                        }
                        Err(e) => error!("Workflow {}/{} aborted: {}", task_id, file_id, e),
                    }
                    metrics::ACTIVE_WORKFLOWS.dec();
                }
            })
            .collect();

        let count = workflows.len();
        let active = Arc::clone(&self.active);
        let mut registry = self.active.write().await;
        let join = {
            let task_id = task_id.clone();
            tokio::spawn(async move {
                join_all(workflows).await;
                active.write().await.remove(&task_id);
                debug!("All workflows of task {} returned", task_id);
            })
        };
        registry.insert(task_id.clone(), ActiveTask { stop, join });
        debug!("Launched {} workflows for task {}", count, task_id);
    }

    /// Load a task the caller owns; anything else is not found.
    fn owned_task(&self, user_id: &str, task_id: &str) -> Result<Task, CoordinatorError> {
        match self.store.get(task_id)? {
            Some(task) if task.user_id == user_id => Ok(task),
            _ => Err(CoordinatorError::NotFound(task_id.to_string())),
        }
    }

    fn detail(&self, task: &Task) -> TaskDetail {
        let now = Utc::now();
        let files = task
            .files
            .iter()
            .map(|file| {
                let mut detail = FileDetail::from_record(file);
                if file.status == FileStatus::Completed {
                    let key = file
                        .output_key
                        .clone()
                        .unwrap_or_else(|| keys::output_key(&task.task_id, &file.file_id, &file.filename));
                    match self.objects.download_url(&key, self.config.download_url_ttl()) {
                        Ok(url) => {
                            detail.download_url = Some(url.url);
                            detail.download_expires_at = Some(url.expires_at);
                        }
                        Err(e) => warn!("Cannot sign download URL for {}: {}", key, e),
                    }
                }
                detail
            })
            .collect();

        TaskDetail {
            task_id: task.task_id.clone(),
            status: task.status(),
            quality_preset: task.quality_preset,
            progress_percentage: task.progress_percentage(),
            current_step: task.current_step(),
            file_count: task.files.len(),
            completed_count: task.completed_count(),
            failed_count: task.failed_count(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            cancelled_at: task.cancelled_at,
            expires_at: task.expires_at,
            estimated_completion_time: task
                .estimated_completion(self.config.max_concurrent_files, now),
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ManifestEntry;
    use crate::preset::QualityPreset;
    use crate::task::SqliteTaskStore;
    use crate::testing::{fixtures, MemoryObjectStore, MockQualityScorer, MockTranscodeEngine};
    use crate::workflow::{RetryConfig, WorkflowConfig};

    struct Harness {
        store: Arc<SqliteTaskStore>,
        objects: MemoryObjectStore,
        engine: MockTranscodeEngine,
        coordinator: TaskCoordinator,
    }

    fn harness(max_concurrent: usize) -> Harness {
        let store = Arc::new(SqliteTaskStore::in_memory().unwrap());
        let objects = MemoryObjectStore::new();
        let engine = MockTranscodeEngine::new(objects.clone());
        let scorer = MockQualityScorer::new();
        let config = CoordinatorConfig::default()
            .with_max_concurrent_files(max_concurrent)
            .with_workflow(
                WorkflowConfig::default()
                    .with_poll_interval_ms(5)
                    .with_retry(RetryConfig::immediate(3)),
            );

        let coordinator = TaskCoordinator::new(
            config,
            SubmissionLimits::default(),
            RetentionConfig::default(),
            store.clone(),
            Arc::new(objects.clone()),
            Arc::new(engine.clone()),
            Arc::new(scorer),
            None,
        );

        Harness {
            store,
            objects,
            engine,
            coordinator,
        }
    }

    fn manifest(names: &[&str], preset: &str) -> SubmitRequest {
        SubmitRequest {
            files: names
                .iter()
                .map(|name| ManifestEntry {
                    filename: name.to_string(),
                    file_size: 1_000,
                })
                .collect(),
            quality_preset: preset.to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_task_with_upload_urls() {
        let h = harness(5);
        let response = h
            .coordinator
            .submit("alice", manifest(&["a.mov", "b.mp4"], "balanced+"))
            .await
            .unwrap();

        assert_eq!(response.status, TaskStatus::Pending);
        assert_eq!(response.uploads.len(), 2);
        assert_eq!(response.uploads[0].file_id, "f1");
        assert_eq!(response.uploads[1].file_id, "f2");
        assert!(response.uploads[0]
            .upload_url
            .contains(&keys::source_key(&response.task_id, "f1", "a.mov")));

        let task = h.store.get(&response.task_id).unwrap().unwrap();
        assert_eq!(task.user_id, "alice");
        assert!(task.files.iter().all(|f| f.status == FileStatus::Pending));
    }

    #[tokio::test]
    async fn test_rejected_submission_creates_nothing() {
        let h = harness(5);
        let result = h
            .coordinator
            .submit("alice", manifest(&["a.mov", "notes.txt"], "balanced"))
            .await;

        assert!(matches!(result, Err(CoordinatorError::Validation(_))));
        assert!(h.coordinator.list("alice", None, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_tasks_are_not_found() {
        let h = harness(5);
        let response = h
            .coordinator
            .submit("alice", manifest(&["a.mov"], "high"))
            .await
            .unwrap();

        assert!(matches!(
            h.coordinator.status("bob", &response.task_id),
            Err(CoordinatorError::NotFound(_))
        ));
        assert!(matches!(
            h.coordinator.start("bob", &response.task_id).await,
            Err(CoordinatorError::NotFound(_))
        ));
        assert!(h.coordinator.list("bob", None, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_runs_task_to_completion() {
        let h = harness(5);
        let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 3);
        h.store.create(&task).unwrap();
        fixtures::upload_sources(&h.objects, &task).await;

        h.coordinator.start("alice", "t1").await.unwrap();
        h.coordinator.wait_idle("t1").await;

        let detail = h.coordinator.status("alice", "t1").unwrap();
        assert_eq!(detail.status, TaskStatus::Completed);
        assert_eq!(detail.progress_percentage, 100);
        assert!(detail.estimated_completion_time.is_none());
        assert!(detail.files.iter().all(|f| f.download_url.is_some()));

        let again = h.coordinator.start("alice", "t1").await;
        assert!(matches!(again, Err(CoordinatorError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_terminal_task_conflicts() {
        let h = harness(5);
        let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 1);
        h.store.create(&task).unwrap();

        let detail = h.coordinator.cancel("alice", "t1").await.unwrap();
        assert_eq!(detail.status, TaskStatus::Cancelled);
        assert_eq!(detail.files[0].status, FileStatus::Pending);

        let again = h.coordinator.cancel("alice", "t1").await;
        assert!(matches!(again, Err(CoordinatorError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_stops_running_workflows() {
        let h = harness(1);
        h.engine.set_stalled(true).await;
        let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 3);
        h.store.create(&task).unwrap();
        fixtures::upload_sources(&h.objects, &task).await;

        h.coordinator.start("alice", "t1").await.unwrap();
        while h.engine.submit_count().await == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        h.coordinator.cancel("alice", "t1").await.unwrap();
        h.coordinator.wait_idle("t1").await;

        let task = h.store.get("t1").unwrap().unwrap();
        assert_eq!(task.status(), TaskStatus::Cancelled);
        let statuses: Vec<_> = task.files.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![FileStatus::Converting, FileStatus::Pending, FileStatus::Pending]
        );
        assert_eq!(h.engine.submit_count().await, 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let h = harness(5);
        for id in ["t1", "t2"] {
            h.store
                .create(&fixtures::task(id, "alice", QualityPreset::High, 1))
                .unwrap();
        }
        h.coordinator.cancel("alice", "t2").await.unwrap();

        let all = h.coordinator.list("alice", None, None).unwrap();
        assert_eq!(all.len(), 2);

        let cancelled = h
            .coordinator
            .list("alice", Some(TaskStatus::Cancelled), Some(500))
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].task_id, "t2");
    }

    #[tokio::test]
    async fn test_shutdown_leaves_tasks_resumable() {
        let h = harness(2);
        h.engine.set_stalled(true).await;
        let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 2);
        h.store.create(&task).unwrap();
        fixtures::upload_sources(&h.objects, &task).await;

        h.coordinator.start("alice", "t1").await.unwrap();
        while h.engine.submit_count().await < 2 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        h.coordinator.shutdown().await;
        assert!(!h.coordinator.is_active("t1").await);

        let resumable = h.store.list_resumable().unwrap();
        assert_eq!(resumable.len(), 1);
        assert_eq!(resumable[0].status(), TaskStatus::Converting);
    }
}
