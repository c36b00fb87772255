//! Testing utilities and mock implementations.
//!
//! This module provides in-memory and mock implementations of the external
//! service traits, so whole task workflows can run without a transcoder,
//! scorer or blob store.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelpress_core::testing::{MemoryObjectStore, MockQualityScorer, MockTranscodeEngine};
//!
//! let objects = MemoryObjectStore::new();
//! let engine = MockTranscodeEngine::new(objects.clone());
//! let scorer = MockQualityScorer::new();
//!
//! // Force an escalation for balanced+
//! scorer.set_score(QualityPreset::Balanced, 0.91).await;
//! ```

mod memory_store;
mod mock_scorer;
mod mock_transcoder;

pub use memory_store::MemoryObjectStore;
pub use mock_scorer::{MockQualityScorer, DEFAULT_SCORE};
pub use mock_transcoder::MockTranscodeEngine;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};

    use crate::preset::QualityPreset;
    use crate::storage::keys;
    use crate::task::{FileRecord, Task};

    use super::MemoryObjectStore;

    /// A pending file record.
    pub fn file(file_id: &str, filename: &str, size_bytes: u64) -> FileRecord {
        FileRecord::new(file_id, filename, size_bytes, Utc::now())
    }

    /// A task with `count` pending files named `clip-{n}.mov`, expiring in 90 days.
    pub fn task(task_id: &str, user_id: &str, preset: QualityPreset, count: usize) -> Task {
        let files = (1..=count)
            .map(|n| file(&format!("f{}", n), &format!("clip-{}.mov", n), 1_000))
            .collect();
        Task::new(task_id, user_id, preset, files, Utc::now(), Duration::days(90))
    }

    /// Upload a 1000-byte source object for every file of the task.
    pub async fn upload_sources(objects: &MemoryObjectStore, task: &Task) {
        for file in &task.files {
            objects
                .insert(
                    keys::source_key(&task.task_id, &file.file_id, &file.filename),
                    vec![1u8; file.source_size_bytes as usize],
                )
                .await;
        }
    }
}
