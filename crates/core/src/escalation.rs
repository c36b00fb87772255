//! Quality escalation engine.
//!
//! Pure decision logic: given a [`PresetPolicy`] and the ordered history of
//! scored attempts for one file, decide whether to convert again with a
//! higher preset or to accept one of the attempts. Nothing here looks at
//! clocks, job ids or file identity.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::preset::{PresetPolicy, QualityPreset};

/// One verified conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredAttempt {
    pub preset: QualityPreset,
    pub score: f64,
}

impl ScoredAttempt {
    pub fn new(preset: QualityPreset, score: f64) -> Self {
        Self { preset, score }
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// Convert (again) with this preset.
    Retry(QualityPreset),
    /// Stop converting and keep `attempt`.
    Accept {
        attempt: ScoredAttempt,
        /// Set when an adaptive ladder ran out without reaching the threshold.
        best_effort: bool,
    },
}

/// Decide the next step for a file.
///
/// An empty history asks for the first rung of the policy.
pub fn decide(policy: &PresetPolicy, attempts: &[ScoredAttempt]) -> Decision {
    let Some(last) = attempts.last().copied() else {
        return Decision::Retry(policy.first_preset());
    };

    match policy {
        PresetPolicy::Fixed(_) => Decision::Accept {
            attempt: last,
            best_effort: false,
        },
        PresetPolicy::Adaptive { ladder, threshold } => {
            if last.score >= *threshold {
                return Decision::Accept {
                    attempt: last,
                    best_effort: false,
                };
            }

            let rung = ladder
                .iter()
                .position(|preset| *preset == last.preset)
                .unwrap_or(attempts.len() - 1);

            match ladder.get(rung + 1) {
                Some(next) => Decision::Retry(*next),
                None => Decision::Accept {
                    attempt: best_attempt(attempts).unwrap_or(last),
                    best_effort: true,
                },
            }
        }
    }
}

/// Highest-scoring attempt; equal scores go to the higher quality tier.
pub fn best_attempt(attempts: &[ScoredAttempt]) -> Option<ScoredAttempt> {
    attempts.iter().copied().reduce(|best, candidate| {
        match compare_scores(candidate.score, best.score) {
            Ordering::Greater => candidate,
            Ordering::Equal if candidate.preset.tier() > best.preset.tier() => candidate,
            _ => best,
        }
    })
}

// NaN sorts below every real score.
fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
