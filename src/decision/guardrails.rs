//! Post-bandit guardrail rules (`spec.md` §4.4). Each rule may only tighten
//! a field relative to what an earlier rule already set, never loosen it —
//! grounded on the teacher's `HeuristicLearner::suggest`, which composes
//! several threshold adjustments over one mutable `StrategyParams` in a
//! fixed order rather than picking a single winning rule.

use crate::config::FeatureFlags;
use crate::types::{Difficulty, GuardrailAdjustment, StrategyParams, UserState};

#[derive(Debug, Clone, Default)]
pub struct GuardrailOutcome {
    pub strategy: StrategyParams,
    pub suggest_rest: bool,
    pub fired: Vec<GuardrailAdjustment>,
}

fn record(
    fired: &mut Vec<GuardrailAdjustment>,
    rule: &'static str,
    field: &'static str,
    before: impl std::fmt::Debug,
    after: impl std::fmt::Debug,
) {
    fired.push(GuardrailAdjustment {
        rule: rule.to_string(),
        field: field.to_string(),
        before: format!("{:?}", before),
        after: format!("{:?}", after),
    });
}

/// Applies every guardrail in the fixed order of `spec.md` §4.4: fatigue-high,
/// fatigue-mid, motivation-low, attention-low. Rules only ever tighten a
/// field (a later rule cannot relax a cap an earlier rule imposed).
pub fn apply(state: &UserState, strategy: StrategyParams) -> GuardrailOutcome {
    let mut s = strategy;
    let mut fired = Vec::new();
    let mut suggest_rest = false;

    if state.fatigue > 0.8 {
        if s.batch_size > 5 {
            record(&mut fired, "fatigue_high", "batch_size", s.batch_size, 5u32);
            s.batch_size = 5;
        }
        if s.hint_level < 1 {
            record(&mut fired, "fatigue_high", "hint_level", s.hint_level, 1u8);
            s.hint_level = 1;
        }
        suggest_rest = true;
        fired.push(GuardrailAdjustment {
            rule: "fatigue_high".to_string(),
            field: "suggest_rest".to_string(),
            before: "false".into(),
            after: "true".into(),
        });
    } else if state.fatigue > 0.6 {
        if matches!(s.difficulty, Difficulty::Hard) {
            record(&mut fired, "fatigue_mid", "difficulty", s.difficulty, Difficulty::Mid);
            s.difficulty = Difficulty::Mid;
        }
        if s.batch_size > 8 {
            record(&mut fired, "fatigue_mid", "batch_size", s.batch_size, 8u32);
            s.batch_size = 8;
        }
    }

    if state.motivation < -0.5 {
        if !matches!(s.difficulty, Difficulty::Easy) {
            record(&mut fired, "motivation_low", "difficulty", s.difficulty, Difficulty::Easy);
            s.difficulty = Difficulty::Easy;
        }
        if s.hint_level < 1 {
            record(&mut fired, "motivation_low", "hint_level", s.hint_level, 1u8);
            s.hint_level = 1;
        }
        if s.new_ratio > 0.2 {
            record(&mut fired, "motivation_low", "new_ratio", s.new_ratio, 0.2f64);
            s.new_ratio = 0.2;
        }
    }

    if state.attention < 0.3 {
        if s.batch_size > 5 {
            record(&mut fired, "attention_low", "batch_size", s.batch_size, 5u32);
            s.batch_size = 5;
        }
        if s.hint_level < 1 {
            record(&mut fired, "attention_low", "hint_level", s.hint_level, 1u8);
            s.hint_level = 1;
        }
    }

    GuardrailOutcome { strategy: s, suggest_rest, fired }
}

/// Optional post-filter (off by default, `EngineConfig.feature_flags.habit_nudging`)
/// nudging batch size and new-word ratio toward a user's typical rhythm.
/// Supplemented from `original_source/`'s habit-profile tracking; outside
/// `spec.md`'s action table but does not contradict any Non-goal.
pub fn apply_habit_nudge(
    flags: &FeatureFlags,
    outcome: &mut GuardrailOutcome,
    preferred_batch_size: Option<u32>,
) {
    if !flags.habit_nudging {
        return;
    }
    if let Some(target) = preferred_batch_size {
        let delta = target as i64 - outcome.strategy.batch_size as i64;
        if delta.abs() >= 2 {
            let before = outcome.strategy.batch_size;
            let nudged = (outcome.strategy.batch_size as i64 + delta.signum()).clamp(5, 16) as u32;
            outcome.strategy.batch_size = nudged;
            record(&mut outcome.fired, "habit_nudge", "batch_size", before, nudged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(fatigue: f64, motivation: f64, attention: f64) -> UserState {
        let mut s = UserState::default();
        s.fatigue = fatigue;
        s.motivation = motivation;
        s.attention = attention;
        s
    }

    #[test]
    fn high_fatigue_suggests_rest_and_caps_batch() {
        let state = state_with(0.85, 0.0, 0.7);
        let strategy = StrategyParams { batch_size: 16, hint_level: 0, ..StrategyParams::default() };
        let outcome = apply(&state, strategy);
        assert!(outcome.suggest_rest);
        assert_eq!(outcome.strategy.batch_size, 5);
        assert!(outcome.strategy.hint_level >= 1);
        assert!(!outcome.fired.is_empty());
    }

    #[test]
    fn mid_fatigue_does_not_suggest_rest() {
        let state = state_with(0.7, 0.0, 0.7);
        let strategy =
            StrategyParams { batch_size: 16, difficulty: Difficulty::Hard, ..StrategyParams::default() };
        let outcome = apply(&state, strategy);
        assert!(!outcome.suggest_rest);
        assert_eq!(outcome.strategy.batch_size, 8);
        assert_eq!(outcome.strategy.difficulty, Difficulty::Mid);
    }

    #[test]
    fn low_motivation_forces_easy_difficulty() {
        let state = state_with(0.0, -0.6, 0.7);
        let strategy =
            StrategyParams { difficulty: Difficulty::Hard, new_ratio: 0.4, ..StrategyParams::default() };
        let outcome = apply(&state, strategy);
        assert_eq!(outcome.strategy.difficulty, Difficulty::Easy);
        assert!(outcome.strategy.new_ratio <= 0.2);
    }

    #[test]
    fn low_attention_caps_batch_and_raises_hints() {
        let state = state_with(0.0, 0.0, 0.2);
        let strategy = StrategyParams { batch_size: 16, hint_level: 0, ..StrategyParams::default() };
        let outcome = apply(&state, strategy);
        assert_eq!(outcome.strategy.batch_size, 5);
        assert!(outcome.strategy.hint_level >= 1);
    }

    #[test]
    fn later_rules_never_loosen_an_earlier_cap() {
        // fatigue_mid caps batch_size <= 8; attention_low then tightens to <= 5;
        // the result must never come back out above 5.
        let state = state_with(0.7, 0.0, 0.2);
        let strategy = StrategyParams { batch_size: 16, ..StrategyParams::default() };
        let outcome = apply(&state, strategy);
        assert_eq!(outcome.strategy.batch_size, 5);
    }

    #[test]
    fn nominal_state_fires_no_guardrails() {
        let state = state_with(0.2, 0.5, 0.8);
        let strategy = StrategyParams::default();
        let outcome = apply(&state, strategy);
        assert!(outcome.fired.is_empty());
        assert!(!outcome.suggest_rest);
    }
}
