//! Mock transcoding engine for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborator::{CollaboratorError, JobStatus, TranscodeEngine, TranscodeRequest};
use crate::preset::QualityPreset;
use crate::storage::ObjectStore;

use super::MemoryObjectStore;

#[derive(Debug)]
struct MockJob {
    /// Statuses returned by the next polls; the final status repeats.
    statuses: VecDeque<JobStatus>,
    finished: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    next_id: u64,
    jobs: HashMap<String, MockJob>,
    submitted: Vec<TranscodeRequest>,
    poll_count: usize,
    in_flight: usize,
    max_in_flight: usize,
    /// Statuses every new job reports before its final status.
    progress: Vec<JobStatus>,
    /// Final statuses for the next jobs, in submission order.
    final_statuses: VecDeque<JobStatus>,
    submit_errors: VecDeque<CollaboratorError>,
    poll_errors: VecDeque<CollaboratorError>,
    /// Jobs never finish while set.
    stalled: bool,
}

/// Mock implementation of [`TranscodeEngine`].
///
/// On submit the mock writes a fake output object to the request's output
/// key, sized per preset, so the rest of the workflow finds real bytes.
///
/// # Example
///
/// ```rust,ignore
/// use reelpress_core::testing::{MemoryObjectStore, MockTranscodeEngine};
///
/// let objects = MemoryObjectStore::new();
/// let engine = MockTranscodeEngine::new(objects.clone());
///
/// // First job fails with a throttling code, the retry succeeds
/// engine.push_final_status(JobStatus::Failed { code: Some(1517), message: "busy".into() }).await;
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscodeEngine {
    objects: MemoryObjectStore,
    state: Arc<RwLock<EngineState>>,
}

impl MockTranscodeEngine {
    pub fn new(objects: MemoryObjectStore) -> Self {
        Self {
            objects,
            state: Arc::new(RwLock::new(EngineState::default())),
        }
    }

    /// Statuses each new job reports before finishing.
    pub async fn set_progress(&self, statuses: Vec<JobStatus>) {
        self.state.write().await.progress = statuses;
    }

    /// Final status for the next submitted job (FIFO). Jobs complete by default.
    pub async fn push_final_status(&self, status: JobStatus) {
        self.state.write().await.final_statuses.push_back(status);
    }

    /// Error returned by the next submit call.
    pub async fn push_submit_error(&self, error: CollaboratorError) {
        self.state.write().await.submit_errors.push_back(error);
    }

    /// Error returned by the next poll call.
    pub async fn push_poll_error(&self, error: CollaboratorError) {
        self.state.write().await.poll_errors.push_back(error);
    }

    /// Keep every job progressing until unstalled.
    pub async fn set_stalled(&self, stalled: bool) {
        self.state.write().await.stalled = stalled;
    }

    /// Requests submitted so far.
    pub async fn submitted(&self) -> Vec<TranscodeRequest> {
        self.state.read().await.submitted.clone()
    }

    /// Presets of the submitted jobs for one file, in order.
    pub async fn presets_for(&self, file_id: &str) -> Vec<QualityPreset> {
        self.state
            .read()
            .await
            .submitted
            .iter()
            .filter(|r| r.file_id == file_id)
            .map(|r| r.preset)
            .collect()
    }

    pub async fn submit_count(&self) -> usize {
        self.state.read().await.submitted.len()
    }

    pub async fn poll_count(&self) -> usize {
        self.state.read().await.poll_count
    }

    /// Highest number of jobs that were running at the same time.
    pub async fn max_in_flight(&self) -> usize {
        self.state.read().await.max_in_flight
    }

    /// Output size written for a preset.
    pub fn output_size(preset: QualityPreset) -> usize {
        match preset.tier() {
            crate::preset::QualityTier::Compression => 300,
            crate::preset::QualityTier::Balanced => 400,
            crate::preset::QualityTier::High => 600,
        }
    }
}

#[async_trait]
impl TranscodeEngine for MockTranscodeEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &TranscodeRequest) -> Result<String, CollaboratorError> {
        let job_id = {
            let mut state = self.state.write().await;
            if let Some(error) = state.submit_errors.pop_front() {
                return Err(error);
            }

            state.next_id += 1;
            let job_id = format!("job-{}", state.next_id);
            let mut statuses: VecDeque<JobStatus> = state.progress.iter().cloned().collect();
            let last = state.final_statuses.pop_front().unwrap_or(JobStatus::Complete);
            statuses.push_back(last);

            state.jobs.insert(
                job_id.clone(),
                MockJob {
                    statuses,
                    finished: false,
                },
            );
            state.submitted.push(request.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            job_id
        };

        let size = Self::output_size(request.preset);
        self.objects
            .put(&request.output_key, vec![7u8; size])
            .await
            .map_err(|e| CollaboratorError::permanent(e.to_string()))?;

        Ok(job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobStatus, CollaboratorError> {
        let mut state = self.state.write().await;
        state.poll_count += 1;
        if let Some(error) = state.poll_errors.pop_front() {
            return Err(error);
        }
        let stalled = state.stalled;

        let Some(job) = state.jobs.get_mut(job_id) else {
            return Err(CollaboratorError::permanent(format!("unknown job {}", job_id)));
        };

        if stalled {
            return Ok(JobStatus::Progressing { percent: None });
        }

        let status = if job.statuses.len() > 1 {
            job.statuses.pop_front().unwrap_or(JobStatus::Complete)
        } else {
            job.statuses.front().cloned().unwrap_or(JobStatus::Complete)
        };

        let newly_finished = status.is_finished() && !job.finished;
        if newly_finished {
            job.finished = true;
            state.in_flight = state.in_flight.saturating_sub(1);
        }

        Ok(status)
    }
}
