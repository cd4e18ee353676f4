//! EMA motivation tracker with a streak bonus, grounded on the teacher's
//! `MotivationTracker`.

#[derive(Debug, Clone, Copy)]
pub struct MotivationParams {
    pub rho: f64,
    pub kappa: f64,
    pub lambda: f64,
    pub mu: f64,
}

impl Default for MotivationParams {
    fn default() -> Self {
        Self { rho: 0.9, kappa: 0.1, lambda: 0.15, mu: 0.2 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MotivationEvent {
    pub is_correct: bool,
    pub is_quit: bool,
    /// Session-start self-rating in `[-1, 1]`, if the client collected one.
    pub self_rating: Option<f64>,
}

pub struct MotivationTracker {
    params: MotivationParams,
    current: f64,
    streak: u32,
}

impl MotivationTracker {
    pub fn new(params: MotivationParams) -> Self {
        Self { params, current: 0.5, streak: 0 }
    }

    pub fn from_persisted(params: MotivationParams, current: f64) -> Self {
        Self { params, current: current.clamp(-1.0, 1.0), streak: 0 }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn update(&mut self, event: MotivationEvent) -> f64 {
        let p = &self.params;
        if event.is_quit {
            self.current = p.rho * self.current - p.mu;
            self.streak = 0;
        } else if event.is_correct {
            self.streak += 1;
            let streak_bonus = (self.streak as f64 / 10.0).min(0.5) * p.kappa;
            self.current = p.rho * self.current + p.kappa + streak_bonus;
        } else {
            self.streak = 0;
            self.current = p.rho * self.current - p.lambda;
        }
        // A self-rating nudges the EMA a little further in its own
        // direction rather than overriding the behavioral signal outright.
        if let Some(rating) = event.self_rating {
            self.current = 0.9 * self.current + 0.1 * rating.clamp(-1.0, 1.0);
        }
        self.current = self.current.clamp(-1.0, 1.0);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quitting_lowers_motivation() {
        let mut m = MotivationTracker::new(MotivationParams::default());
        let before = m.current();
        let after = m.update(MotivationEvent { is_correct: false, is_quit: true });
        assert!(after < before);
    }

    #[test]
    fn streak_of_correct_answers_raises_motivation() {
        let mut m = MotivationTracker::new(MotivationParams::default());
        for _ in 0..5 {
            m.update(MotivationEvent { is_correct: true, is_quit: false });
        }
        assert!(m.current() > 0.5);
    }

    #[test]
    fn stays_within_bounds() {
        let mut m = MotivationTracker::new(MotivationParams::default());
        for _ in 0..100 {
            m.update(MotivationEvent { is_correct: true, is_quit: false });
            assert!(m.current() >= -1.0 && m.current() <= 1.0);
        }
    }
}
