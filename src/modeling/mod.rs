pub mod attention;
pub mod cognitive;
pub mod fatigue;
pub mod motivation;

use crate::config::{AttentionConfig, FatigueConfig};
use crate::types::{CognitiveProfile, UserState};
use attention::{AttentionFeatures, AttentionMonitor, AttentionWeights};
use cognitive::{CognitiveInput, CognitiveParams, CognitiveProfiler};
use fatigue::{FatigueEstimator, FatigueFeatures, FatigueParams};
use motivation::{MotivationEvent, MotivationParams, MotivationTracker};

/// Bundles one sub-model instance per user. Owned by the control layer;
/// never calls back into the engine (no cyclic dependency between modeling
/// and control).
pub struct UserModels {
    pub attention: AttentionMonitor,
    pub fatigue: FatigueEstimator,
    pub cognitive: CognitiveProfiler,
    pub motivation: MotivationTracker,
}

impl UserModels {
    pub fn new(attention_cfg: &AttentionConfig, fatigue_cfg: &FatigueConfig) -> Self {
        Self {
            attention: AttentionMonitor::new(AttentionWeights::default(), attention_cfg.smoothing),
            fatigue: FatigueEstimator::new(FatigueParams {
                k: fatigue_cfg.k,
                session_gap_ms: fatigue_cfg.session_gap_ms,
                long_break_ms: fatigue_cfg.long_break_ms,
                ..FatigueParams::default()
            }),
            cognitive: CognitiveProfiler::new(CognitiveParams::default()),
            motivation: MotivationTracker::new(MotivationParams::default()),
        }
    }

    /// Rehydrates per-submodel runtime state from a previously persisted
    /// `UserState` snapshot, so a reload mid-session resumes rather than
    /// resetting to cold-start priors.
    pub fn from_persisted(
        attention_cfg: &AttentionConfig,
        fatigue_cfg: &FatigueConfig,
        state: &UserState,
    ) -> Self {
        Self {
            attention: AttentionMonitor::from_persisted(
                AttentionWeights::default(),
                attention_cfg.smoothing,
                state.attention,
            ),
            fatigue: FatigueEstimator::from_persisted(
                FatigueParams {
                    k: fatigue_cfg.k,
                    session_gap_ms: fatigue_cfg.session_gap_ms,
                    long_break_ms: fatigue_cfg.long_break_ms,
                    ..FatigueParams::default()
                },
                state.fatigue,
                state.ts,
            ),
            cognitive: CognitiveProfiler::from_persisted(CognitiveParams::default(), state.cognitive),
            motivation: MotivationTracker::from_persisted(MotivationParams::default(), state.motivation),
        }
    }

    pub fn snapshot(&self, conf: f64, ts: i64, feature_version: u32) -> UserState {
        UserState {
            attention: self.attention.current(),
            fatigue: self.fatigue.current(),
            cognitive: self.cognitive.profile(),
            motivation: self.motivation.current(),
            conf: conf.clamp(0.0, 1.0),
            ts,
            feature_version,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelingInputs {
    pub attention: AttentionFeatures,
    pub fatigue: FatigueFeatures,
    pub cognitive: CognitiveInputWrapper,
    pub motivation: MotivationEvent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CognitiveInputWrapper {
    pub accuracy: f64,
    pub avg_response_time_ms: f64,
}

/// Confidence halves roughly every 6.5 hours of silence (`0.9^hours`);
/// a fresh event always pulls confidence back toward 1.0, so staleness
/// decay and new evidence never fight each other across a gap.
pub const CONFIDENCE_DECAY_PER_HOUR: f64 = 0.9;

/// Runs one modeling step across all sub-models and returns the refreshed
/// latent state. `prior_conf`/`elapsed_ms` drive the confidence term:
/// staleness decay is applied first, then a fresh event raises it partway
/// back toward 1.0 (`spec.md` §3: "conf decreases with staleness of
/// evidence").
pub fn update_modeling(
    models: &mut UserModels,
    inputs: ModelingInputs,
    prior_conf: f64,
    elapsed_ms: i64,
    now_ts: i64,
    feature_version: u32,
) -> UserState {
    models.attention.update(inputs.attention);
    models.fatigue.update(inputs.fatigue, now_ts);
    models.cognitive.update(CognitiveInput {
        accuracy: inputs.cognitive.accuracy,
        avg_response_time_ms: inputs.cognitive.avg_response_time_ms,
    });
    models.motivation.update(inputs.motivation);

    let decayed = crate::types::decay_conf(prior_conf, elapsed_ms, CONFIDENCE_DECAY_PER_HOUR);
    let conf = (0.7 * decayed + 0.3).clamp(0.0, 1.0);
    models.snapshot(conf, now_ts, feature_version)
}

pub fn cognitive_profile_default() -> CognitiveProfile {
    CognitiveProfile::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttentionConfig, FatigueConfig};

    #[test]
    fn fresh_event_after_long_silence_partly_restores_confidence() {
        let mut models = UserModels::new(&AttentionConfig::default(), &FatigueConfig::default());
        let state = update_modeling(&mut models, ModelingInputs::default(), 0.9, 6 * 3_600_000, 0, 1);
        // six hours of silence roughly halves 0.9, but the fresh event
        // pulls it back up rather than leaving it fully decayed.
        assert!(state.conf > 0.9 * 0.9_f64.powi(6));
        assert!(state.conf <= 1.0);
    }
}
