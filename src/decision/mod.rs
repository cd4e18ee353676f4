//! Decision layer: maps an ensemble outcome onto guardrail-adjusted strategy
//! parameters plus an explanation (`spec.md` §4.4).

pub mod explain;
pub mod guardrails;

use crate::config::FeatureFlags;
use crate::learning::EnsembleOutcome;
use crate::types::{DecisionExplanation, RewardBreakdown, StrategyParams, UserState};

pub struct Decision {
    pub strategy: StrategyParams,
    pub suggest_rest: bool,
    pub explanation: DecisionExplanation,
}

/// Applies guardrails to the ensemble's chosen strategy and builds the
/// explanation record. `ensemble_weights` is `None` while cold start is
/// active, since the ensemble is bypassed entirely in that phase.
pub fn decide(
    state: &UserState,
    outcome: &EnsembleOutcome,
    ensemble_weights: [(crate::learning::ensemble::ScorerKind, f64); 4],
    feature_flags: &FeatureFlags,
    preferred_batch_size: Option<u32>,
    reward_breakdown: Option<RewardBreakdown>,
) -> Decision {
    let mut guardrail_outcome = guardrails::apply(state, outcome.strategy);
    guardrails::apply_habit_nudge(feature_flags, &mut guardrail_outcome, preferred_batch_size);

    let explanation = explain::build(
        state,
        ensemble_weights,
        guardrail_outcome.fired,
        outcome.used_cold_start,
        reward_breakdown,
    );

    Decision {
        strategy: guardrail_outcome.strategy,
        suggest_rest: guardrail_outcome.suggest_rest,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::ensemble::SCORER_ORDER;
    use crate::types::Difficulty;

    #[test]
    fn cold_start_outcome_skips_guardrail_tightening_when_nominal() {
        let state = UserState::default();
        let outcome = EnsembleOutcome {
            strategy: StrategyParams::default(),
            candidates: vec![],
            used_cold_start: true,
            action_index: Some(0),
        };
        let weights = [
            (SCORER_ORDER[0], 0.25),
            (SCORER_ORDER[1], 0.25),
            (SCORER_ORDER[2], 0.25),
            (SCORER_ORDER[3], 0.25),
        ];
        let decision = decide(&state, &outcome, weights, &FeatureFlags::default(), None, None);
        assert!(!decision.suggest_rest);
        assert!(decision.explanation.text.contains("cold-start"));
    }

    #[test]
    fn high_fatigue_state_forces_rest_suggestion_through_full_pipeline() {
        let mut state = UserState::default();
        state.fatigue = 0.9;
        let outcome = EnsembleOutcome {
            strategy: StrategyParams { difficulty: Difficulty::Hard, ..StrategyParams::default() },
            candidates: vec![],
            used_cold_start: false,
            action_index: None,
        };
        let weights = [
            (SCORER_ORDER[0], 0.25),
            (SCORER_ORDER[1], 0.25),
            (SCORER_ORDER[2], 0.25),
            (SCORER_ORDER[3], 0.25),
        ];
        let decision = decide(&state, &outcome, weights, &FeatureFlags::default(), None, None);
        assert!(decision.suggest_rest);
        assert!(!decision.explanation.guardrails_fired.is_empty());
    }
}
