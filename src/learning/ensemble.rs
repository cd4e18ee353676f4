//! Combines four scorers (LinUCB, Thompson, cold-start, ACT-R-informed) with
//! adaptive weights updated by an exponentiated-gradient rule, and snaps the
//! weighted-merged continuous strategy onto the nearest discrete action-space
//! point. The merge/snap shape and the exact discrete option arrays are
//! grounded on the teacher's `decision/ensemble.rs`
//! (`snap_interval_scale`/`snap_new_ratio`/`snap_batch_size`), which already
//! uses identical option sets to `spec.md`'s action table; the teacher's
//! weights are static (0.4/0.4/0.2) where this module's are adaptive.

use crate::types::{
    Difficulty, StrategyParams, BATCH_SIZE_OPTIONS, HINT_LEVEL_OPTIONS, INTERVAL_SCALE_OPTIONS,
    NEW_RATIO_OPTIONS,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScorerKind {
    LinUcb,
    Thompson,
    ColdStart,
    ActR,
}

pub const SCORER_ORDER: [ScorerKind; 4] =
    [ScorerKind::LinUcb, ScorerKind::Thompson, ScorerKind::ColdStart, ScorerKind::ActR];

#[derive(Debug, Clone)]
pub struct Candidate {
    pub kind: ScorerKind,
    pub strategy: StrategyParams,
    pub confidence: f64,
}

pub struct EnsembleWeights {
    weights: [f64; 4],
    learning_rate: f64,
    reward_history: [VecDeque<f64>; 4],
    history_cap: usize,
}

fn snap<const N: usize>(value: f64, options: [f64; N]) -> f64 {
    options
        .iter()
        .copied()
        .min_by(|a, b| (a - value).abs().partial_cmp(&(b - value).abs()).unwrap())
        .unwrap_or(value)
}

fn snap_u32<const N: usize>(value: f64, options: [u32; N]) -> u32 {
    options
        .iter()
        .copied()
        .min_by(|a, b| {
            ((*a as f64) - value).abs().partial_cmp(&((*b as f64) - value).abs()).unwrap()
        })
        .unwrap_or(options[0])
}

fn snap_u8<const N: usize>(value: f64, options: [u8; N]) -> u8 {
    options
        .iter()
        .copied()
        .min_by(|a, b| {
            ((*a as f64) - value).abs().partial_cmp(&((*b as f64) - value).abs()).unwrap()
        })
        .unwrap_or(options[0])
}

fn difficulty_score(d: Difficulty) -> f64 {
    match d {
        Difficulty::Easy => 0.0,
        Difficulty::Mid => 1.0,
        Difficulty::Hard => 2.0,
    }
}

fn score_to_difficulty(score: f64) -> Difficulty {
    if score < 0.5 {
        Difficulty::Easy
    } else if score < 1.5 {
        Difficulty::Mid
    } else {
        Difficulty::Hard
    }
}

impl EnsembleWeights {
    pub fn new(learning_rate: f64, history_cap: usize) -> Self {
        Self {
            weights: [0.25; 4],
            learning_rate,
            reward_history: Default::default(),
            history_cap,
        }
    }

    pub fn weights(&self) -> [(ScorerKind, f64); 4] {
        [
            (SCORER_ORDER[0], self.weights[0]),
            (SCORER_ORDER[1], self.weights[1]),
            (SCORER_ORDER[2], self.weights[2]),
            (SCORER_ORDER[3], self.weights[3]),
        ]
    }

    fn index(kind: ScorerKind) -> usize {
        SCORER_ORDER.iter().position(|k| *k == kind).unwrap()
    }

    fn weight_of(&self, kind: ScorerKind) -> f64 {
        self.weights[Self::index(kind)]
    }

    /// Merges candidates into one `StrategyParams`, weighting each
    /// continuous field by `confidence * current_weight` before snapping to
    /// the nearest discrete option.
    pub fn merge(&self, candidates: &[Candidate]) -> StrategyParams {
        if candidates.is_empty() {
            return StrategyParams::default();
        }
        let mut total_w = 0.0;
        let mut interval_scale = 0.0;
        let mut new_ratio = 0.0;
        let mut batch_size = 0.0;
        let mut hint_level = 0.0;
        let mut difficulty = 0.0;

        for c in candidates {
            let w = (self.weight_of(c.kind) * c.confidence).max(0.0);
            total_w += w;
            interval_scale += w * c.strategy.interval_scale;
            new_ratio += w * c.strategy.new_ratio;
            batch_size += w * c.strategy.batch_size as f64;
            hint_level += w * c.strategy.hint_level as f64;
            difficulty += w * difficulty_score(c.strategy.difficulty);
        }

        if total_w <= f64::EPSILON {
            return StrategyParams::default();
        }

        StrategyParams {
            interval_scale: snap(interval_scale / total_w, INTERVAL_SCALE_OPTIONS),
            new_ratio: snap(new_ratio / total_w, NEW_RATIO_OPTIONS),
            difficulty: score_to_difficulty(difficulty / total_w),
            batch_size: snap_u32(batch_size / total_w, BATCH_SIZE_OPTIONS),
            hint_level: snap_u8(hint_level / total_w, HINT_LEVEL_OPTIONS),
        }
    }

    /// Exponentiated-gradient update: `w_i <- w_i * exp(eta * r_i)`,
    /// renormalised over the simplex. `rewards` gives a per-scorer observed
    /// reward for this round (scorers with no opinion this round should pass
    /// their running mean, not 0, to avoid unfairly punishing silence).
    pub fn update(&mut self, rewards: [f64; 4]) {
        for i in 0..4 {
            self.weights[i] *= (self.learning_rate * rewards[i]).exp();
            self.reward_history[i].push_back(rewards[i]);
            if self.reward_history[i].len() > self.history_cap {
                self.reward_history[i].pop_front();
            }
        }
        let sum: f64 = self.weights.iter().sum();
        if sum.is_finite() && sum > f64::EPSILON {
            for w in &mut self.weights {
                *w /= sum;
            }
        } else {
            // Defensive restore: invalid weights reset to uniform rather
            // than propagating NaN/Inf into the next merge.
            self.weights = [0.25; 4];
        }
    }

    /// Builds the per-scorer reward vector `update` expects from what each
    /// scorer actually proposed this round, so the exponentiated-gradient
    /// update receives a differentiated signal instead of the same scalar
    /// four times over (which cancels under renormalisation and leaves the
    /// weights permanently uniform). A scorer whose candidate matched the
    /// action actually taken earns the realized reward; one that proposed a
    /// different action earns nothing for the round; one that had no
    /// opinion at all (e.g. every non-cold-start scorer during a cold-start
    /// round) passes its own running mean, per `update`'s contract.
    pub fn attribute_rewards(&self, scorer_matches: &[(ScorerKind, bool)], realized_reward: f64) -> [f64; 4] {
        std::array::from_fn(|i| {
            let kind = SCORER_ORDER[i];
            match scorer_matches.iter().find(|(k, _)| *k == kind) {
                Some((_, true)) => realized_reward,
                Some((_, false)) => 0.0,
                None => self.mean_reward(kind),
            }
        })
    }

    pub fn mean_reward(&self, kind: ScorerKind) -> f64 {
        let hist = &self.reward_history[Self::index(kind)];
        if hist.is_empty() {
            0.0
        } else {
            hist.iter().sum::<f64>() / hist.len() as f64
        }
    }

    /// Serialisable snapshot for persistence: weights plus each scorer's
    /// bounded reward history, flattened in `SCORER_ORDER`.
    pub fn to_persisted(&self) -> PersistedEnsemble {
        PersistedEnsemble {
            weights: self.weights,
            reward_history: std::array::from_fn(|i| self.reward_history[i].iter().copied().collect()),
        }
    }

    /// Restores from a persisted snapshot. Per `spec.md` §4.3/§9, a single
    /// invalid field never poisons the whole restore: an invalid weight
    /// vector falls back to uniform, and reward history is filtered to
    /// finite numbers only.
    pub fn from_persisted(persisted: &PersistedEnsemble, learning_rate: f64, history_cap: usize) -> Self {
        let sum: f64 = persisted.weights.iter().sum();
        let weights = if persisted.weights.iter().all(|w| w.is_finite() && *w >= 0.0) && sum > f64::EPSILON
        {
            let mut w = persisted.weights;
            for x in &mut w {
                *x /= sum;
            }
            w
        } else {
            [0.25; 4]
        };

        let reward_history = std::array::from_fn(|i| {
            let mut hist: VecDeque<f64> =
                persisted.reward_history[i].iter().copied().filter(|r| r.is_finite()).collect();
            while hist.len() > history_cap {
                hist.pop_front();
            }
            hist
        });

        Self { weights, learning_rate, reward_history, history_cap }
    }
}

/// Plain-data form of [`EnsembleWeights`] for JSON persistence.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistedEnsemble {
    pub weights: [f64; 4],
    pub reward_history: [Vec<f64>; 4],
}
