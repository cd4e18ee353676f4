pub mod actr_scorer;
pub mod coldstart;
pub mod ensemble;
pub mod linucb;
pub mod matrix;
pub mod thompson;

use crate::config::{EnsembleConfig, LinUcbConfig};
use crate::types::StrategyParams;
use coldstart::{ColdStartConfig, ColdStartScorer};
use ensemble::{Candidate, EnsembleWeights, ScorerKind};
use linucb::LinUcbModel;
use thompson::ThompsonModel;

/// Per-user bundle of learners, owned by the control layer.
pub struct UserLearners {
    pub linucb: LinUcbModel,
    pub thompson: ThompsonModel,
    pub coldstart: ColdStartScorer,
    pub ensemble: EnsembleWeights,
}

impl UserLearners {
    pub fn new(linucb_cfg: &LinUcbConfig, ensemble_cfg: &EnsembleConfig, dimension: usize) -> Self {
        Self {
            linucb: LinUcbModel::new(dimension, linucb_cfg.alpha, linucb_cfg.lambda),
            thompson: ThompsonModel::new(),
            coldstart: ColdStartScorer::new(ColdStartConfig::default()),
            ensemble: EnsembleWeights::new(ensemble_cfg.learning_rate, ensemble_cfg.reward_history_size),
        }
    }
}

/// One fixed action in the discrete strategy table, addressable by index for
/// the bandit layers.
#[derive(Debug, Clone)]
pub struct ActionTable {
    pub actions: Vec<StrategyParams>,
}

impl ActionTable {
    /// Builds the full cross-product action table from the guardrail option
    /// sets (`spec.md` §4.4).
    pub fn full() -> Self {
        use crate::types::{
            Difficulty, BATCH_SIZE_OPTIONS, HINT_LEVEL_OPTIONS, INTERVAL_SCALE_OPTIONS,
            NEW_RATIO_OPTIONS,
        };
        let mut actions = Vec::new();
        for &interval_scale in INTERVAL_SCALE_OPTIONS.iter() {
            for &new_ratio in NEW_RATIO_OPTIONS.iter() {
                for difficulty in [Difficulty::Easy, Difficulty::Mid, Difficulty::Hard] {
                    for &batch_size in BATCH_SIZE_OPTIONS.iter() {
                        for &hint_level in HINT_LEVEL_OPTIONS.iter() {
                            actions.push(StrategyParams {
                                interval_scale,
                                new_ratio,
                                difficulty,
                                batch_size,
                                hint_level,
                            });
                        }
                    }
                }
            }
        }
        Self { actions }
    }

    pub fn get(&self, index: u32) -> Option<StrategyParams> {
        self.actions.get(index as usize).copied()
    }
}

/// Runs the full ensemble decision for one event: cold start overrides the
/// ensemble while active; otherwise LinUCB, Thompson, cold-start-as-prior and
/// the ACT-R scorer each contribute a candidate, merged by adaptive weights.
pub struct EnsembleOutcome {
    pub strategy: StrategyParams,
    pub candidates: Vec<Candidate>,
    pub used_cold_start: bool,
    /// The discrete action-table index this outcome corresponds to, when one
    /// is unambiguous: the probe index during cold start, or the LinUCB
    /// candidate's own index once the ensemble is active (the merged
    /// strategy itself has no single index once snapped from a blend).
    pub action_index: Option<u32>,
}

pub fn decide(
    learners: &mut UserLearners,
    table: &ActionTable,
    context: &[f64],
    retrieval_probability: f64,
    actr_decay: f64,
    actr_tau: f64,
    actr_s: f64,
) -> EnsembleOutcome {
    if learners.coldstart.is_active() {
        let idx = learners.coldstart.next_action();
        let strategy = table.get(idx).unwrap_or_default();
        return EnsembleOutcome {
            strategy,
            candidates: vec![],
            used_cold_start: true,
            action_index: Some(idx),
        };
    }

    let action_candidates: Vec<(u32, Vec<f64>)> =
        table.actions.iter().enumerate().map(|(i, _)| (i as u32, context.to_vec())).collect();
    let linucb_best = learners.linucb.select(&action_candidates);
    let thompson_best = learners
        .thompson
        .select(&(0..table.actions.len() as u32).collect::<Vec<_>>());

    let mut candidates = Vec::new();
    let mut linucb_index = None;
    if let Some(best) = linucb_best {
        if let Some(strategy) = table.get(best.action_index) {
            linucb_index = Some(best.action_index);
            candidates.push(Candidate {
                kind: ScorerKind::LinUcb,
                strategy,
                confidence: best.confidence.min(1.0).max(0.1),
            });
        }
    }
    if let Some((idx, sample)) = thompson_best {
        if let Some(strategy) = table.get(idx) {
            candidates.push(Candidate { kind: ScorerKind::Thompson, strategy, confidence: sample });
        }
    }
    let (actr_strategy, actr_conf) = crate::learning::actr_scorer::suggest(retrieval_probability);
    let _ = (actr_decay, actr_tau, actr_s);
    candidates.push(Candidate { kind: ScorerKind::ActR, strategy: actr_strategy, confidence: actr_conf });

    let strategy = learners.ensemble.merge(&candidates);
    EnsembleOutcome { strategy, candidates, used_cold_start: false, action_index: linucb_index }
}
