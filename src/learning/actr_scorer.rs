//! ACT-R-informed ensemble scorer: turns a word's retrieval probability into
//! a strategy suggestion (low retrieval probability -> easier difficulty,
//! more hints, shorter interval; high retrieval probability -> the reverse).
//! This is the fourth ensemble member named in `spec.md` §4.3; there is no
//! direct teacher equivalent (the teacher's own ACT-R-adjacent code lives in
//! `umm/` as a full memory-model replacement), so this module is new,
//! written in the style of `umm/msmt.rs` (module consts, pure functions).

use crate::actr_math::retrieval_probability;
use crate::types::{Difficulty, StrategyParams};

pub fn suggest(retrieval_p: f64) -> (StrategyParams, f64) {
    let strategy = if retrieval_p < 0.3 {
        StrategyParams {
            interval_scale: 0.5,
            new_ratio: 0.1,
            difficulty: Difficulty::Easy,
            batch_size: 5,
            hint_level: 2,
        }
    } else if retrieval_p < 0.7 {
        StrategyParams {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: Difficulty::Mid,
            batch_size: 8,
            hint_level: 1,
        }
    } else {
        StrategyParams {
            interval_scale: 1.5,
            new_ratio: 0.3,
            difficulty: Difficulty::Hard,
            batch_size: 12,
            hint_level: 0,
        }
    };
    // Confidence is highest near the extremes, where the retrieval signal is
    // least ambiguous.
    let confidence = (2.0 * (retrieval_p - 0.5).abs()).clamp(0.2, 1.0);
    (strategy, confidence)
}

pub fn score_from_ages(ages_days: &[f64], decay: f64, tau: f64, s: f64) -> (StrategyParams, f64) {
    let activation = crate::actr_math::base_level_activation(ages_days, decay);
    let p = retrieval_probability(activation, tau, s);
    suggest(p)
}
