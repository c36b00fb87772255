//! Mock quality scorer for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborator::{CollaboratorError, QualityScorer};
use crate::preset::QualityPreset;
use crate::storage::keys;

/// Score returned when nothing was configured for a preset.
pub const DEFAULT_SCORE: f64 = 0.97;

#[derive(Debug, Default)]
struct ScorerState {
    by_preset: HashMap<QualityPreset, f64>,
    /// Scores for specific files, consumed in order; wins over `by_preset`.
    by_file: HashMap<String, VecDeque<f64>>,
    errors: VecDeque<CollaboratorError>,
    calls: Vec<(String, String)>,
}

/// Mock implementation of [`QualityScorer`].
///
/// The preset is read back from the attempt staging key, so scores can be
/// configured per preset to drive escalation.
#[derive(Debug, Clone, Default)]
pub struct MockQualityScorer {
    state: Arc<RwLock<ScorerState>>,
}

impl MockQualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_score(&self, preset: QualityPreset, score: f64) {
        self.state.write().await.by_preset.insert(preset, score);
    }

    /// Scores for successive attempts of one file.
    pub async fn set_file_scores(&self, file_id: &str, scores: Vec<f64>) {
        self.state
            .write()
            .await
            .by_file
            .insert(file_id.to_string(), scores.into());
    }

    /// Error returned by the next score call.
    pub async fn push_error(&self, error: CollaboratorError) {
        self.state.write().await.errors.push_back(error);
    }

    /// `(source_key, output_key)` pairs scored so far.
    pub async fn calls(&self) -> Vec<(String, String)> {
        self.state.read().await.calls.clone()
    }

    fn file_id_of(output_key: &str) -> Option<&str> {
        output_key.split('/').nth(2)
    }
}

#[async_trait]
impl QualityScorer for MockQualityScorer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn score(&self, source_key: &str, output_key: &str) -> Result<f64, CollaboratorError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.errors.pop_front() {
            return Err(error);
        }
        state
            .calls
            .push((source_key.to_string(), output_key.to_string()));

        if let Some(file_id) = Self::file_id_of(output_key) {
            if let Some(score) = state.by_file.get_mut(file_id).and_then(|s| s.pop_front()) {
                return Ok(score);
            }
        }

        Ok(keys::attempt_preset(output_key)
            .and_then(|preset| state.by_preset.get(&preset).copied())
            .unwrap_or(DEFAULT_SCORE))
    }
}
