//! Scheduling integration tests.
//!
//! Concurrency limits, cancellation of running tasks, and resuming
//! interrupted tasks with a fresh coordinator over the same database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use reelpress_core::{
    testing::{fixtures, MemoryObjectStore, MockQualityScorer, MockTranscodeEngine},
    workflow::RetryConfig,
    CollaboratorError, CoordinatorConfig, FileStatus, JobStatus, QualityPreset, RetentionConfig,
    SqliteTaskStore, SubmissionLimits, TaskCoordinator, TaskStatus, TaskStore, WorkflowConfig,
};

fn coordinator(
    db_path: &Path,
    objects: &MemoryObjectStore,
    engine: &MockTranscodeEngine,
    scorer: &MockQualityScorer,
    max_concurrent: usize,
) -> (Arc<SqliteTaskStore>, TaskCoordinator) {
    let store = Arc::new(SqliteTaskStore::new(db_path).expect("Failed to open task store"));
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
        Arc::new(scorer.clone()),
        None,
    );
    (store, coordinator)
}

async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_concurrency_limit_per_task() {
    let temp_dir = TempDir::new().unwrap();
    let objects = MemoryObjectStore::new();
    let engine = MockTranscodeEngine::new(objects.clone());
    let scorer = MockQualityScorer::new();
    engine
        .set_progress(vec![
            JobStatus::Queued,
            JobStatus::Progressing { percent: Some(20) },
            JobStatus::Progressing { percent: Some(60) },
            JobStatus::Progressing { percent: Some(90) },
        ])
        .await;
    let (store, coordinator) =
        coordinator(&temp_dir.path().join("test.db"), &objects, &engine, &scorer, 2);

    let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 6);
    store.create(&task).unwrap();
    fixtures::upload_sources(&objects, &task).await;

    coordinator.start("alice", "t1").await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_idle("t1"))
        .await
        .expect("workflows did not finish");

    assert_eq!(engine.max_in_flight().await, 2);
    assert_eq!(engine.submit_count().await, 6);
    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.files.iter().all(|f| f.progress == 100));
}

#[tokio::test]
async fn test_tasks_do_not_share_slots() {
    let temp_dir = TempDir::new().unwrap();
    let objects = MemoryObjectStore::new();
    let engine = MockTranscodeEngine::new(objects.clone());
    let scorer = MockQualityScorer::new();
    engine.set_stalled(true).await;
    let (store, coordinator) =
        coordinator(&temp_dir.path().join("test.db"), &objects, &engine, &scorer, 1);

    for id in ["t1", "t2"] {
        let task = fixtures::task(id, "alice", QualityPreset::High, 2);
        store.create(&task).unwrap();
        fixtures::upload_sources(&objects, &task).await;
        coordinator.start("alice", id).await.unwrap();
    }

    wait_for("one job per task", || async { engine.submit_count().await == 2 }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.submit_count().await, 2);

    engine.set_stalled(false).await;
    for id in ["t1", "t2"] {
        tokio::time::timeout(Duration::from_secs(10), coordinator.wait_idle(id))
            .await
            .expect("workflows did not finish");
        assert_eq!(store.get(id).unwrap().unwrap().status(), TaskStatus::Completed);
    }
}

#[tokio::test]
async fn test_cancelled_task_ignores_late_results() {
    let temp_dir = TempDir::new().unwrap();
    let objects = MemoryObjectStore::new();
    let engine = MockTranscodeEngine::new(objects.clone());
    let scorer = MockQualityScorer::new();
    engine.set_stalled(true).await;
    let (store, coordinator) =
        coordinator(&temp_dir.path().join("test.db"), &objects, &engine, &scorer, 2);

    let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 3);
    store.create(&task).unwrap();
    fixtures::upload_sources(&objects, &task).await;
    coordinator.start("alice", "t1").await.unwrap();

    wait_for("two running jobs", || async {
        store
            .get("t1")
            .unwrap()
            .map(|t| t.files.iter().filter(|f| f.transcode_job_id.is_some()).count() == 2)
            .unwrap_or(false)
    })
    .await;

    let detail = coordinator.cancel("alice", "t1").await.unwrap();
    assert_eq!(detail.status, TaskStatus::Cancelled);

    engine.set_stalled(false).await;
    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_idle("t1"))
        .await
        .expect("workflows did not stop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Cancelled);
    let converting = task
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Converting)
        .count();
    let pending = task
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Pending)
        .count();
    assert_eq!((converting, pending), (2, 1));
    assert!(scorer.calls().await.is_empty());
    assert!(store.list_resumable().unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_resumes_running_jobs() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let objects = MemoryObjectStore::new();
    let engine = MockTranscodeEngine::new(objects.clone());
    let scorer = MockQualityScorer::new();
    engine.set_stalled(true).await;

    let (store, first) = coordinator(&db_path, &objects, &engine, &scorer, 5);
    let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 2);
    store.create(&task).unwrap();
    fixtures::upload_sources(&objects, &task).await;
    first.start("alice", "t1").await.unwrap();

    wait_for("job ids recorded", || async {
        store
            .get("t1")
            .unwrap()
            .map(|t| t.files.iter().all(|f| f.transcode_job_id.is_some()))
            .unwrap_or(false)
    })
    .await;
    first.shutdown().await;
    drop(first);

    engine.set_stalled(false).await;
    let (store, second) = coordinator(&db_path, &objects, &engine, &scorer, 5);
    assert_eq!(second.resume().await.unwrap(), 1);
    tokio::time::timeout(Duration::from_secs(10), second.wait_idle("t1"))
        .await
        .expect("resumed workflows did not finish");

    let task = store.get("t1").unwrap().unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    // The jobs submitted before the restart were polled, not resubmitted.
    assert_eq!(engine.submit_count().await, 2);
    assert_eq!(second.resume().await.unwrap(), 0);
}

#[tokio::test]
async fn test_transient_errors_exhaust_retry_budget() {
    let temp_dir = TempDir::new().unwrap();
    let objects = MemoryObjectStore::new();
    let engine = MockTranscodeEngine::new(objects.clone());
    let scorer = MockQualityScorer::new();
    for _ in 0..4 {
        scorer
            .push_error(CollaboratorError::transient("scorer unavailable"))
            .await;
    }
    let (store, coordinator) =
        coordinator(&temp_dir.path().join("test.db"), &objects, &engine, &scorer, 5);

    let task = fixtures::task("t1", "alice", QualityPreset::Balanced, 1);
    store.create(&task).unwrap();
    fixtures::upload_sources(&objects, &task).await;
    coordinator.start("alice", "t1").await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), coordinator.wait_idle("t1"))
        .await
        .expect("workflow did not finish");

    let task = store.get("t1").unwrap().unwrap();
    let file = task.file("f1").unwrap();
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.error_code.as_deref(), Some("RETRY_EXHAUSTED"));
    assert_eq!(file.retry_count, 3);
    assert_eq!(task.status(), TaskStatus::Failed);
}
