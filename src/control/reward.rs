//! Realized reward computation for the sweeper (`spec.md` §4.5 step 2,
//! §9 Open Questions: the exact functional form is left undecided, only
//! that it be deterministic, bounded to `[-1, 1]`, and computed at sweep
//! time from decision-time data plus downstream signals up to `dueTs`).
//! Adopted per `DESIGN.md`'s Open Question decision: a weighted
//! accuracy/speed/stability/retention composition, mirroring the shape the
//! teacher's own `services/delayed_reward.rs` had already settled on.

use crate::actr_math::{base_level_activation, retrieval_probability};
use crate::config::{MasteryConfig, RewardConfig};
use crate::error::EngineError;
use crate::persistence::Store;
use crate::types::{DecisionRecord, RewardBreakdown, WordMemoryTrace};

fn clamp_signed(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn recent_accuracy(trace: &WordMemoryTrace, window: usize) -> f64 {
    if trace.reviews.is_empty() {
        return 0.5;
    }
    let take = window.min(trace.reviews.len());
    let correct = trace.reviews.iter().rev().take(take).filter(|r| r.correct).count();
    correct as f64 / take as f64
}

/// Faster-than-3s responses push this positive, slower push it negative.
fn speed_component(trace: &WordMemoryTrace) -> f64 {
    match trace.reviews.back() {
        Some(last) => clamp_signed(1.0 - last.response_time_ms / 3000.0),
        None => 0.0,
    }
}

/// A short run of consecutive correct answers reads as a stable retrieval;
/// a reset streak reads as unstable.
fn stability_component(consecutive_correct: u32) -> f64 {
    clamp_signed((consecutive_correct as f64 / 5.0) * 2.0 - 1.0)
}

/// Computes the bounded, deterministic realized reward for `record` from
/// whatever has happened with this (user, word) since the decision was
/// made, plus the per-component breakdown kept for audit
/// (`spec.md` §4.4: explanation carries a reward breakdown).
pub async fn compute(
    store: &dyn Store,
    reward_cfg: &RewardConfig,
    mastery_cfg: &MasteryConfig,
    record: &DecisionRecord,
    now_ts: i64,
) -> Result<(f64, RewardBreakdown), EngineError> {
    let trace = store
        .load_word_trace(&record.user_id, &record.word_id)
        .await?
        .unwrap_or_else(|| WordMemoryTrace::new(record.word_id.clone()));
    let srs = store.load_srs_state(&record.user_id, &record.word_id).await?.unwrap_or_default();

    let accuracy_signed = clamp_signed(2.0 * recent_accuracy(&trace, mastery_cfg.recent_window) - 1.0);
    let speed = speed_component(&trace);
    let stability = stability_component(srs.consecutive_correct);

    let ages: Vec<f64> = trace
        .reviews
        .iter()
        .map(|r| ((now_ts - r.ts).max(0) as f64) / 86_400_000.0)
        .collect();
    let activation = base_level_activation(&ages, mastery_cfg.act_r.decay);
    let retrieval_p = retrieval_probability(activation, mastery_cfg.act_r.tau, mastery_cfg.act_r.s);
    let retention = clamp_signed(2.0 * retrieval_p - 1.0);

    let total = clamp_signed(
        reward_cfg.accuracy_weight * accuracy_signed
            + reward_cfg.speed_weight * speed
            + reward_cfg.stability_weight * stability
            + reward_cfg.retention_weight * retention,
    );

    Ok((total, RewardBreakdown { accuracy: accuracy_signed, speed, stability, retention, total }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::fake_store::InMemoryStore;
    use crate::types::{DecisionExplanation, ReviewEvent, SrsWordState, StrategyParams, UserState};

    fn sample_record() -> DecisionRecord {
        DecisionRecord {
            decision_id: "d1".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            word_id: "w1".into(),
            action_index: Some(0),
            strategy: StrategyParams::default(),
            explanation: DecisionExplanation {
                factors: vec![],
                guardrails_fired: vec![],
                ensemble_weights: vec![],
                reward_breakdown: None,
                text: String::new(),
            },
            state_snapshot: UserState::default(),
            ts: 0,
            scorer_matches: vec![],
        }
    }

    #[tokio::test]
    async fn reward_is_bounded_with_no_downstream_signal() {
        let store = InMemoryStore::default();
        let (total, breakdown) =
            compute(&store, &RewardConfig::default(), &MasteryConfig::default(), &sample_record(), 0)
                .await
                .unwrap();
        assert!((-1.0..=1.0).contains(&total));
        assert_eq!(total, breakdown.total);
    }

    #[tokio::test]
    async fn fast_correct_streak_yields_a_positive_reward() {
        let store = InMemoryStore::default();
        let mut trace = WordMemoryTrace::new("w1".to_string());
        for i in 0..5 {
            trace.record(ReviewEvent { ts: i * 1000, correct: true, response_time_ms: 800.0 });
        }
        store.save_word_trace("u1", &trace).await.unwrap();
        store
            .save_srs_state(
                "u1",
                "w1",
                &SrsWordState { consecutive_correct: 5, ..SrsWordState::default() },
            )
            .await
            .unwrap();

        let (total, _) =
            compute(&store, &RewardConfig::default(), &MasteryConfig::default(), &sample_record(), 4000)
                .await
                .unwrap();
        assert!(total > 0.0);
    }

    #[tokio::test]
    async fn slow_incorrect_streak_yields_a_negative_reward() {
        let store = InMemoryStore::default();
        let mut trace = WordMemoryTrace::new("w1".to_string());
        for i in 0..5 {
            trace.record(ReviewEvent { ts: i * 1000, correct: false, response_time_ms: 6000.0 });
        }
        store.save_word_trace("u1", &trace).await.unwrap();

        let (total, _) =
            compute(&store, &RewardConfig::default(), &MasteryConfig::default(), &sample_record(), 4000)
                .await
                .unwrap();
        assert!(total < 0.0);
    }
}
