//! Builds the 22-dimensional feature vector the learning layer scores
//! candidate strategies against, in the literal grouping order of
//! `spec.md` §4.1: 4 user-state prior + 3 temporal + 5 recent-performance +
//! 5 word-property + 5 interaction features.

use crate::types::{FeatureVector, RawEvent, SrsWordState, UserState};

#[derive(Debug, Clone)]
pub struct NormalizationStat {
    pub mean: f64,
    pub std_dev: f64,
}

impl NormalizationStat {
    pub fn normalize(&self, x: f64) -> f64 {
        if self.std_dev <= f64::EPSILON {
            return 0.0;
        }
        ((x - self.mean) / self.std_dev).clamp(-3.0, 3.0) / 3.0
    }
}

#[derive(Debug, Clone)]
pub struct PerceptionConfig {
    pub response_time: NormalizationStat,
    pub dwell_time: NormalizationStat,
    pub max_pause_count: f64,
    pub max_switch_count: f64,
    pub max_focus_loss_ms: f64,
    pub max_interactions_for_log: f64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            response_time: NormalizationStat { mean: 4000.0, std_dev: 3000.0 },
            dwell_time: NormalizationStat { mean: 2000.0, std_dev: 1500.0 },
            max_pause_count: 10.0,
            max_switch_count: 5.0,
            max_focus_loss_ms: 60_000.0,
            max_interactions_for_log: 500.0,
        }
    }
}

/// Perception layer layout version. A persisted model or feature vector
/// tagged with a different version is rejected with `FeatureMismatch`
/// rather than silently reinterpreted (`spec.md` §4.1).
pub const FEATURE_VERSION: u32 = 1;

pub const FEATURE_LABELS: [&str; 22] = [
    "attention", "fatigue", "motivation", "cognitive_mem",
    "hour_of_day", "day_of_week", "session_duration_norm",
    "recent_accuracy", "response_time_norm", "retry_rate", "hint_rate", "streak_norm",
    "mastery_level_norm", "ease_factor_norm", "interval_norm", "difficulty_affinity", "word_age_norm",
    "pause_rate", "switch_rate", "focus_loss_norm", "dwell_time_norm", "interaction_density",
];

/// Rolling recent-performance window, maintained by the caller of
/// [`build_feature_vector`] across events for the same user/word context.
#[derive(Debug, Clone, Default)]
pub struct RecentPerformance {
    pub accuracy: f64,
    pub avg_response_time_ms: f64,
    pub retry_rate: f64,
    pub hint_rate: f64,
    pub streak: u32,
}

/// Temporal context, supplied by the caller (derived from the event's
/// timestamp and session metadata).
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalContext {
    pub hour_of_day: u8,
    pub day_of_week: u8,
    pub session_duration_ms: f64,
}

fn sanitize(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Builds the literal spec-ordered feature vector. Every component is
/// clipped to a finite range; non-finite inputs are replaced with 0 rather
/// than propagated, per `spec.md` §4.1's edge-case handling.
pub fn build_feature_vector(
    config: &PerceptionConfig,
    state: &UserState,
    temporal: TemporalContext,
    recent: &RecentPerformance,
    word: &SrsWordState,
    event: &RawEvent,
    word_age_days: f64,
    difficulty_affinity: f64,
) -> FeatureVector {
    let mut v = Vec::with_capacity(22);

    // 4 user-state prior
    v.push(sanitize(state.attention));
    v.push(sanitize(state.fatigue));
    v.push(sanitize((state.motivation + 1.0) / 2.0));
    v.push(sanitize(state.cognitive.mem));

    // 3 temporal / segment
    v.push(sanitize(temporal.hour_of_day as f64 / 23.0));
    v.push(sanitize(temporal.day_of_week as f64 / 6.0));
    v.push(sanitize((temporal.session_duration_ms / 3_600_000.0).min(1.0)));

    // 5 recent performance
    v.push(sanitize(recent.accuracy));
    v.push(sanitize(config.response_time.normalize(recent.avg_response_time_ms)));
    v.push(sanitize(recent.retry_rate.min(1.0)));
    v.push(sanitize(recent.hint_rate.min(1.0)));
    v.push(sanitize((recent.streak as f64 / 10.0).min(1.0)));

    // 5 word properties
    v.push(sanitize(word.mastery_level as f64 / 5.0));
    v.push(sanitize(((word.ease_factor - 1.3) / (3.0 - 1.3)).clamp(0.0, 1.0)));
    v.push(sanitize((word.current_interval_days / 365.0).min(1.0)));
    v.push(sanitize(difficulty_affinity.clamp(0.0, 1.0)));
    v.push(sanitize((word_age_days / 365.0).min(1.0)));

    // 5 interaction features
    v.push(sanitize((event.pause_count as f64 / config.max_pause_count).min(1.0)));
    v.push(sanitize((event.switch_count as f64 / config.max_switch_count).min(1.0)));
    v.push(sanitize((event.focus_loss_duration_ms / config.max_focus_loss_ms).min(1.0)));
    v.push(sanitize(config.dwell_time.normalize(event.dwell_time_ms)));
    v.push(sanitize(event.interaction_density.clamp(0.0, 1.0)));

    debug_assert_eq!(v.len(), 22);

    FeatureVector {
        values: v,
        labels: FEATURE_LABELS.iter().map(|s| s.to_string()).collect(),
        feature_version: FEATURE_VERSION,
        ts: event.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> RawEvent {
        RawEvent {
            is_correct: true,
            response_time_ms: 2500.0,
            dwell_time_ms: 1800.0,
            retry_count: 0,
            hint_used: false,
            paused_time_ms: 0.0,
            word_id: "w1".into(),
            pause_count: 1,
            switch_count: 0,
            focus_loss_duration_ms: 0.0,
            interaction_density: 0.5,
            timestamp: 1_700_000_000_000,
            is_quit: false,
            session_id: "s1".into(),
            self_rating: None,
        }
    }

    #[test]
    fn produces_exactly_22_finite_components() {
        let config = PerceptionConfig::default();
        let state = UserState::default();
        let recent = RecentPerformance::default();
        let word = SrsWordState::default();
        let event = sample_event();
        let fv = build_feature_vector(
            &config,
            &state,
            TemporalContext::default(),
            &recent,
            &word,
            &event,
            0.0,
            0.5,
        );
        assert_eq!(fv.dim(), 22);
        assert!(fv.values.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn nan_inputs_are_replaced_not_propagated() {
        let config = PerceptionConfig::default();
        let mut state = UserState::default();
        state.attention = f64::NAN;
        let recent = RecentPerformance::default();
        let word = SrsWordState::default();
        let event = sample_event();
        let fv = build_feature_vector(
            &config,
            &state,
            TemporalContext::default(),
            &recent,
            &word,
            &event,
            0.0,
            0.5,
        );
        assert!(fv.values[0].is_finite());
    }
}
