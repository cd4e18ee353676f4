//! EMA-based cognitive sub-profile (memory, speed, stability), grounded on
//! the teacher's `CognitiveProfiler`.

use crate::types::CognitiveProfile;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
pub struct CognitiveParams {
    pub memory_alpha: f64,
    pub speed_baseline_ms: f64,
    pub stability_window: usize,
}

impl Default for CognitiveParams {
    fn default() -> Self {
        Self { memory_alpha: 0.1, speed_baseline_ms: 3000.0, stability_window: 20 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CognitiveInput {
    pub accuracy: f64,
    pub avg_response_time_ms: f64,
}

pub struct CognitiveProfiler {
    params: CognitiveParams,
    profile: CognitiveProfile,
    accuracy_history: VecDeque<f64>,
}

fn compute_variance(samples: &VecDeque<f64>) -> f64 {
    let n = samples.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / n;
    samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n
}

impl CognitiveProfiler {
    pub fn new(params: CognitiveParams) -> Self {
        Self { params, profile: CognitiveProfile::default(), accuracy_history: VecDeque::new() }
    }

    /// Rehydrates from a persisted profile; the rolling accuracy history
    /// used for the stability term restarts empty (it is not part of the
    /// persisted `UserState`), matching a slow, low-stakes reconvergence.
    pub fn from_persisted(params: CognitiveParams, profile: CognitiveProfile) -> Self {
        Self { params, profile, accuracy_history: VecDeque::new() }
    }

    pub fn profile(&self) -> CognitiveProfile {
        self.profile
    }

    pub fn update(&mut self, input: CognitiveInput) -> CognitiveProfile {
        let alpha = self.params.memory_alpha;
        self.profile.mem = (alpha * input.accuracy + (1.0 - alpha) * self.profile.mem).clamp(0.0, 1.0);

        let speed_norm = (input.avg_response_time_ms / (self.params.speed_baseline_ms * 3.0)).min(1.0);
        self.profile.speed = (1.0 - speed_norm).clamp(0.0, 1.0);

        self.accuracy_history.push_back(input.accuracy);
        if self.accuracy_history.len() > self.params.stability_window {
            self.accuracy_history.pop_front();
        }
        self.profile.stability = if self.accuracy_history.len() >= 3 {
            (1.0 - (compute_variance(&self.accuracy_history) * 4.0).min(1.0)).clamp(0.0, 1.0)
        } else {
            0.5
        };

        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_unit_range() {
        let mut p = CognitiveProfiler::new(CognitiveParams::default());
        for _ in 0..30 {
            let profile = p.update(CognitiveInput { accuracy: 1.0, avg_response_time_ms: 500.0 });
            assert!(profile.mem >= 0.0 && profile.mem <= 1.0);
            assert!(profile.speed >= 0.0 && profile.speed <= 1.0);
            assert!(profile.stability >= 0.0 && profile.stability <= 1.0);
        }
    }

    #[test]
    fn consistent_accuracy_raises_stability() {
        let mut p = CognitiveProfiler::new(CognitiveParams::default());
        for _ in 0..10 {
            p.update(CognitiveInput { accuracy: 0.9, avg_response_time_ms: 1000.0 });
        }
        assert!(p.profile().stability > 0.5);
    }
}
