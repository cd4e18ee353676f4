//! Thompson sampling over Beta posteriors, one per discrete action, grounded
//! on the teacher's `decision/thompson.rs`.

use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaParams {
    fn default() -> Self {
        Self { alpha: 1.0, beta: 1.0 }
    }
}

impl BetaParams {
    fn sample(&self, rng: &mut impl Rng) -> f64 {
        // Beta(a, b) via two Gammas, Marsaglia-Tsang.
        let x = sample_gamma(self.alpha, rng);
        let y = sample_gamma(self.beta, rng);
        if x + y <= f64::EPSILON {
            0.5
        } else {
            x / (x + y)
        }
    }
}

fn sample_gamma(shape: f64, rng: &mut impl Rng) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.random();
        return sample_gamma(shape + 1.0, rng) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let mut x;
        let mut v;
        loop {
            x = sample_normal(rng);
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        v = v * v * v;
        let u: f64 = rng.random();
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

fn sample_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub struct ThompsonModel {
    arms: HashMap<u32, BetaParams>,
}

impl ThompsonModel {
    pub fn new() -> Self {
        Self { arms: HashMap::new() }
    }

    fn arm_mut(&mut self, action_index: u32) -> &mut BetaParams {
        self.arms.entry(action_index).or_insert_with(BetaParams::default)
    }

    pub fn select(&mut self, candidate_indices: &[u32]) -> Option<(u32, f64)> {
        let mut rng = rand::rng();
        candidate_indices
            .iter()
            .map(|idx| {
                let sample = self.arm_mut(*idx).sample(&mut rng);
                (*idx, sample)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn update(&mut self, action_index: u32, reward_in_unit_interval: f64) {
        let r = reward_in_unit_interval.clamp(0.0, 1.0);
        let arm = self.arm_mut(action_index);
        arm.alpha += r;
        arm.beta += 1.0 - r;
    }

    pub fn mean(&self, action_index: u32) -> f64 {
        self.arms
            .get(&action_index)
            .map(|p| p.alpha / (p.alpha + p.beta))
            .unwrap_or(0.5)
    }
}

impl Default for ThompsonModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_shifts_toward_observed_rewards() {
        let mut m = ThompsonModel::new();
        for _ in 0..50 {
            m.update(0, 0.95);
        }
        assert!(m.mean(0) > 0.8);
    }

    #[test]
    fn select_returns_one_of_the_candidates() {
        let mut m = ThompsonModel::new();
        let picked = m.select(&[1, 2, 3]).unwrap();
        assert!([1, 2, 3].contains(&picked.0));
    }
}
