//! Word-Mastery Evaluator (`spec.md` §4.6): fuses SRS level, ACT-R retrieval
//! probability and recent accuracy, dampened by current fatigue, into a
//! learned/not-learned verdict. The ACT-R math is shared with the learning
//! layer's ACT-R scorer via `crate::actr_math`, matching `spec.md`'s note
//! that both consumers use the same base-level-activation formula.

use crate::actr_math::{base_level_activation, retrieval_probability};
use crate::config::MasteryConfig;
use crate::error::EngineError;
use crate::persistence::Store;
use crate::types::{SrsWordState, UserState, WordMemoryTrace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suggestion {
    ReviewNow,
    ReviewToday,
    Stable,
}

#[derive(Debug, Clone, Copy)]
pub struct MasteryFactors {
    pub srs: f64,
    pub actr: f64,
    pub recent: f64,
}

#[derive(Debug, Clone)]
pub struct MasteryVerdict {
    pub is_learned: bool,
    pub score: f64,
    pub confidence: f64,
    pub factors: MasteryFactors,
    pub suggestion: Suggestion,
}

fn recent_accuracy(trace: &WordMemoryTrace, window: usize) -> f64 {
    if trace.reviews.is_empty() {
        return 0.5;
    }
    let take = window.min(trace.reviews.len());
    let correct = trace.reviews.iter().rev().take(take).filter(|r| r.correct).count();
    correct as f64 / take as f64
}

fn ages_days(trace: &WordMemoryTrace, now_ts: i64) -> Vec<f64> {
    trace.reviews.iter().map(|r| ((now_ts - r.ts).max(0) as f64) / 86_400_000.0).collect()
}

/// Pure scoring step, given already-loaded state. Kept separate from the
/// I/O-bearing `evaluate`/`evaluate_many` so the formula itself is directly
/// testable against the spec's literal scenarios.
pub fn score(
    config: &MasteryConfig,
    srs: &SrsWordState,
    trace: &WordMemoryTrace,
    state: &UserState,
    now_ts: i64,
) -> MasteryVerdict {
    let srs_component = srs.mastery_level as f64 / 5.0;
    let activation = base_level_activation(&ages_days(trace, now_ts), config.act_r.decay);
    let actr_component = retrieval_probability(activation, config.act_r.tau, config.act_r.s);
    let recent = recent_accuracy(trace, config.recent_window);

    let score = config.srs_weight * srs_component
        + config.actr_weight * actr_component
        + config.recent_weight * recent;
    let confidence = (1.0 - 0.3 * state.fatigue).clamp(0.0, 1.0);
    let is_learned = (score * confidence) >= config.threshold;
    let suggestion = if actr_component < 0.3 {
        Suggestion::ReviewNow
    } else if actr_component < 0.6 {
        Suggestion::ReviewToday
    } else {
        Suggestion::Stable
    };

    MasteryVerdict {
        is_learned,
        score,
        confidence,
        factors: MasteryFactors { srs: srs_component, actr: actr_component, recent },
        suggestion,
    }
}

pub async fn evaluate_word_mastery(
    store: &dyn Store,
    config: &MasteryConfig,
    user_id: &str,
    word_id: &str,
    now_ts: i64,
) -> Result<MasteryVerdict, EngineError> {
    let srs = store.load_srs_state(user_id, word_id).await?.unwrap_or_default();
    let trace = store
        .load_word_trace(user_id, word_id)
        .await?
        .unwrap_or_else(|| WordMemoryTrace::new(word_id.to_string()));
    let state = store.load_user_state(user_id).await?.unwrap_or_default();
    Ok(score(config, &srs, &trace, &state, now_ts))
}

/// Batch form. Loads `UserState` once and reuses it across every word rather
/// than refetching per word, the one I/O path this crate's `Store` can
/// actually share (`spec.md` §4.6: "must not issue per-word I/O if a bulk
/// path is available").
pub async fn evaluate_many(
    store: &dyn Store,
    config: &MasteryConfig,
    user_id: &str,
    word_ids: &[String],
    now_ts: i64,
) -> Result<Vec<MasteryVerdict>, EngineError> {
    let state = store.load_user_state(user_id).await?.unwrap_or_default();
    let mut out = Vec::with_capacity(word_ids.len());
    for word_id in word_ids {
        let srs = store.load_srs_state(user_id, word_id).await?.unwrap_or_default();
        let trace = store
            .load_word_trace(user_id, word_id)
            .await?
            .unwrap_or_else(|| WordMemoryTrace::new(word_id.clone()));
        out.push(score(config, &srs, &trace, &state, now_ts));
    }
    Ok(out)
}
