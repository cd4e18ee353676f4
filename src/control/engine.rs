//! Orchestration layer (`spec.md` §4.5): the only place perception, modeling,
//! learning and decision are wired together, and the only place that talks
//! to `Store`. Every call that touches a user's state or bandit model runs
//! inside that user's FIFO lock ([`crate::control::lock::UserLockTable`]).

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, TimeZone, Timelike, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::decision;
use crate::learning::ensemble::{EnsembleWeights, ScorerKind};
use crate::learning::linucb::LinUcbModel;
use crate::learning::{self, ActionTable, UserLearners};
use crate::modeling::{self, ModelingInputs, UserModels};
use crate::perception::{self, PerceptionConfig, RecentPerformance, TemporalContext};
use crate::persistence::{blob, cache, BanditSnapshot, Store};
use crate::error::EngineError;
use crate::types::{
    DecisionRecord, FeatureVector, NullSink, ProcessResult, RawEvent, ReviewEvent, RewardStatus,
    SrsState, SrsWordState, Telemetry, UserState, WordMemoryTrace,
};

use super::lock::UserLockTable;
use super::reward_queue;

const CACHE_USER_STATE_TTL: Duration = Duration::from_secs(30);
const CACHE_EXPLANATION_TTL: Duration = Duration::from_secs(300);
const DAY_MS: f64 = 86_400_000.0;

/// Outcome counters for one `Engine::sweep_once` cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub applied: u32,
    pub failed: u32,
}

pub struct Engine {
    store: Arc<dyn Store>,
    cache: Option<cache::ReadThroughCache>,
    locks: Arc<UserLockTable>,
    config: EngineConfig,
    sink: Arc<dyn crate::types::DecisionSink>,
    action_table: ActionTable,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self {
            store,
            cache: None,
            locks: Arc::new(UserLockTable::new()),
            config,
            sink: Arc::new(NullSink),
            action_table: ActionTable::full(),
        }
    }

    pub fn with_cache(mut self, cache: cache::ReadThroughCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn crate::types::DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// `spec.md` §4.5, steps 1-7.
    pub async fn process_event(
        &self,
        user_id: &str,
        event: RawEvent,
        now_ts: i64,
    ) -> Result<ProcessResult, EngineError> {
        if user_id.is_empty() {
            return Err(EngineError::InputError("user_id must not be empty".into()));
        }
        if event.word_id.is_empty() || event.session_id.is_empty() {
            return Err(EngineError::InputError("event missing word_id or session_id".into()));
        }
        if !event.response_time_ms.is_finite() || !event.dwell_time_ms.is_finite() {
            return Err(EngineError::InputError("event contains non-finite timing fields".into()));
        }

        let timeout = Duration::from_millis(self.config.lock.default_timeout_ms);
        let _guard = self.locks.acquire(user_id, timeout).await?;

        let prior_state = self.store.load_user_state(user_id).await?.unwrap_or_default();
        let is_new_user = prior_state.ts == 0;
        // `ts == 0` is the "never touched" sentinel, not a real past
        // timestamp: treating it as a real gap would crush confidence for
        // every brand-new user under the staleness decay below.
        let elapsed_ms = if is_new_user { 0 } else { (now_ts - prior_state.ts).max(0) };

        let mut models = if is_new_user {
            UserModels::new(&self.config.attention, &self.config.fatigue)
        } else {
            UserModels::from_persisted(&self.config.attention, &self.config.fatigue, &prior_state)
        };

        let snapshot = self.store.load_bandit_snapshot(user_id).await?;
        let mut learners = self.rehydrate_learners(&snapshot, user_id);

        let srs = self
            .store
            .load_srs_state(user_id, &event.word_id)
            .await?
            .unwrap_or_default();
        let mut trace = self
            .store
            .load_word_trace(user_id, &event.word_id)
            .await?
            .unwrap_or_else(|| WordMemoryTrace::new(event.word_id.clone()));

        let temporal = derive_temporal(now_ts, prior_state.ts);
        let recent = derive_recent_performance(&trace, &srs, &event);
        let word_age_days = word_age_days(&trace, now_ts);
        let difficulty_affinity = 0.5; // word content metadata is out of scope (spec.md §1)

        let feature_vector = perception::build_feature_vector(
            &PerceptionConfig::default(),
            &prior_state,
            temporal,
            &recent,
            &srs,
            &event,
            word_age_days,
            difficulty_affinity,
        );
        if feature_vector.dim() != self.config.feature.dimension {
            return Err(EngineError::FeatureMismatch {
                expected: self.config.feature.dimension,
                actual: feature_vector.dim(),
            });
        }

        // `UserState::default().conf` (0.5) is the neutral value shown to a
        // caller who asks about a user that's never been touched; it is not
        // a claim that a brand-new user starts half-confident. Seed the
        // confidence update itself from 0 so a cold-start decision reports
        // low confidence (`spec.md` §8 scenario 1) rather than inheriting
        // that display default.
        let prior_conf = if is_new_user { 0.0 } else { prior_state.conf };
        let new_state = modeling::update_modeling(
            &mut models,
            modeling_inputs_from_event(&event),
            prior_conf,
            elapsed_ms,
            now_ts,
            perception::FEATURE_VERSION,
        );

        let ages = review_ages_days(&trace, now_ts);
        let activation =
            crate::actr_math::base_level_activation(&ages, self.config.mastery.act_r.decay);
        let retrieval_p = crate::actr_math::retrieval_probability(
            activation,
            self.config.mastery.act_r.tau,
            self.config.mastery.act_r.s,
        );

        let outcome = learning::decide(
            &mut learners,
            &self.action_table,
            &feature_vector.values,
            retrieval_p,
            self.config.mastery.act_r.decay,
            self.config.mastery.act_r.tau,
            self.config.mastery.act_r.s,
        );
        let action_index = outcome.action_index;
        learners.coldstart.record_interaction();

        let ensemble_weights = learners.ensemble.weights();
        // Habit nudging (`feature_flags.habit_nudging`, default off) wants a
        // preferred batch size derived from a user's typical rhythm; this
        // engine doesn't persist that history, so there is never a target to
        // nudge toward.
        let decision = decision::decide(
            &new_state,
            &outcome,
            ensemble_weights,
            &self.config.feature_flags,
            None,
            None,
        );

        for fired in &decision.explanation.guardrails_fired {
            self.sink.record(user_id, Telemetry::GuardrailFired { rule: fired.rule });
        }

        // Which scorer(s) actually proposed the action taken, so a later
        // `apply_delayed_reward` can credit the realized reward to the
        // scorer(s) that got it right instead of the whole ensemble at once.
        let scorer_matches: Vec<(ScorerKind, bool)> = if outcome.used_cold_start {
            vec![(ScorerKind::ColdStart, true)]
        } else {
            outcome
                .candidates
                .iter()
                .map(|c| (c.kind, c.strategy == outcome.strategy))
                .collect()
        };

        let decision_id = Uuid::new_v4().to_string();

        let mut srs = srs;
        advance_srs(&mut trace, &mut srs, &event, now_ts);

        let record = DecisionRecord {
            decision_id: decision_id.clone(),
            user_id: user_id.to_string(),
            session_id: event.session_id.clone(),
            word_id: event.word_id.clone(),
            action_index,
            strategy: decision.strategy,
            explanation: decision.explanation.clone(),
            state_snapshot: new_state.clone(),
            ts: now_ts,
            scorer_matches,
        };

        self.store.save_user_state(user_id, &new_state).await?;
        self.store.save_interaction_count(user_id, snapshot.interaction_count + 1).await?;
        self.store.save_decision_record(&record).await?;
        self.store
            .save_feature_vector(&decision_id, user_id, &event.session_id, &feature_vector)
            .await?;
        self.store.save_srs_state(user_id, &event.word_id, &srs).await?;
        self.store.save_word_trace(user_id, &trace).await?;
        reward_queue::enqueue(self.store.as_ref(), &self.config.reward, user_id, &decision_id, now_ts)
            .await?;

        if let Some(cache) = &self.cache {
            cache.invalidate(&cache::user_state_key(user_id)).await;
        }

        Ok(ProcessResult {
            user_state: new_state,
            strategy: decision.strategy,
            explanation: decision.explanation,
            decision_id,
            suggest_rest: decision.suggest_rest,
        })
    }

    pub async fn get_user_state(&self, user_id: &str) -> Result<UserState, EngineError> {
        let key = cache::user_state_key(user_id);
        if let Some(cache) = &self.cache {
            if let Some(state) = cache.get::<UserState>(&key).await {
                return Ok(state);
            }
        }
        let state = self.store.load_user_state(user_id).await?.unwrap_or_default();
        if let Some(cache) = &self.cache {
            cache.set(&key, &state, CACHE_USER_STATE_TTL).await;
        }
        Ok(state)
    }

    pub async fn explain(
        &self,
        decision_id: &str,
    ) -> Result<crate::types::DecisionExplanation, EngineError> {
        let key = cache::explanation_key(decision_id);
        if let Some(cache) = &self.cache {
            if let Some(exp) = cache.get::<crate::types::DecisionExplanation>(&key).await {
                return Ok(exp);
            }
        }
        let record = self
            .store
            .load_decision_record(decision_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("decision '{decision_id}'")))?;
        if let Some(cache) = &self.cache {
            cache.set(&key, &record.explanation, CACHE_EXPLANATION_TTL).await;
        }
        Ok(record.explanation)
    }

    pub async fn evaluate_word_mastery(
        &self,
        user_id: &str,
        word_id: &str,
        now_ts: i64,
    ) -> Result<crate::wme::MasteryVerdict, EngineError> {
        crate::wme::evaluate_word_mastery(self.store.as_ref(), &self.config.mastery, user_id, word_id, now_ts)
            .await
    }

    pub async fn evaluate_many(
        &self,
        user_id: &str,
        word_ids: &[String],
        now_ts: i64,
    ) -> Result<Vec<crate::wme::MasteryVerdict>, EngineError> {
        crate::wme::evaluate_many(self.store.as_ref(), &self.config.mastery, user_id, word_ids, now_ts)
            .await
    }

    /// Applies a realised reward to the bandit model for `decision_id`,
    /// inside the same per-user lock `process_event` uses
    /// (`spec.md` §4.5 step 3). Idempotent on `decision_id`: a second call
    /// after the first has completed is a no-op that still reports success.
    pub async fn apply_delayed_reward(
        &self,
        user_id: &str,
        decision_id: &str,
        reward_value: f64,
        now_ts: i64,
    ) -> Result<bool, EngineError> {
        let timeout = Duration::from_millis(self.config.lock.default_timeout_ms);
        let _guard = self.locks.acquire(user_id, timeout).await?;

        if let Some(existing) = self.store.load_reward_by_decision_id(decision_id).await? {
            if existing.status == RewardStatus::Done {
                return Ok(true);
            }
        }

        let record = self
            .store
            .load_decision_record(decision_id)
            .await?
            .ok_or_else(|| EngineError::FeatureMismatch { expected: self.config.feature.dimension, actual: 0 })?;
        let feature_vector = self
            .store
            .load_feature_vector(decision_id)
            .await?
            .ok_or_else(|| EngineError::FeatureMismatch { expected: self.config.feature.dimension, actual: 0 })?;
        if feature_vector.feature_version != perception::FEATURE_VERSION
            || feature_vector.dim() != self.config.feature.dimension
        {
            return Err(EngineError::FeatureMismatch {
                expected: self.config.feature.dimension,
                actual: feature_vector.dim(),
            });
        }

        let reward = reward_value.clamp(-1.0, 1.0);
        let snapshot = self.store.load_bandit_snapshot(&record.user_id).await?;
        let mut learners = self.rehydrate_learners(&snapshot, &record.user_id);

        if let Some(idx) = record.action_index {
            learners.linucb.update(idx, &feature_vector.values, reward);
            let scorer_rewards = learners.ensemble.attribute_rewards(&record.scorer_matches, reward);
            learners.ensemble.update(scorer_rewards);

            let arms = learners
                .linucb
                .export_arms()
                .into_iter()
                .map(|(action_index, a, b)| blob::ArmBlob { action_index, a, b })
                .collect::<Vec<_>>();
            let encoded = blob::encode_linucb(self.config.feature.dimension, &arms);
            self.store.save_linucb_blob(&record.user_id, &encoded).await?;
            self.store.save_ensemble(&record.user_id, &learners.ensemble.to_persisted()).await?;
        }

        if let Some(entry) = self.store.load_reward_by_decision_id(decision_id).await? {
            reward_queue::record_success(self.store.as_ref(), &entry).await?;
        }
        let _ = now_ts;
        Ok(true)
    }

    /// One sweep cycle (`spec.md` §4.5 sweeper, steps 1-4): claims due
    /// entries, computes each one's realized reward, and applies it through
    /// the same `apply_delayed_reward` path `process_event`'s caller would
    /// use, so the two never diverge in how they touch the bandit model.
    pub async fn sweep_once(&self, now_ts: i64, limit: i64) -> Result<SweepStats, EngineError> {
        let claimed = self.store.claim_pending_rewards(now_ts, limit).await?;
        let mut stats = SweepStats::default();

        for entry in claimed {
            match self.store.load_decision_record(&entry.decision_id).await? {
                None => {
                    reward_queue::record_failure(
                        self.store.as_ref(),
                        &self.config.reward,
                        &entry,
                        now_ts,
                        "decision record missing (FeatureMismatch)",
                    )
                    .await?;
                    stats.failed += 1;
                }
                Some(record) => {
                    match super::reward::compute(
                        self.store.as_ref(),
                        &self.config.reward,
                        &self.config.mastery,
                        &record,
                        now_ts,
                    )
                    .await
                    {
                        Ok((reward_value, _breakdown)) => {
                            match self
                                .apply_delayed_reward(&record.user_id, &entry.decision_id, reward_value, now_ts)
                                .await
                            {
                                Ok(_) => stats.applied += 1,
                                Err(err) => {
                                    reward_queue::record_failure(
                                        self.store.as_ref(),
                                        &self.config.reward,
                                        &entry,
                                        now_ts,
                                        &err.to_string(),
                                    )
                                    .await?;
                                    stats.failed += 1;
                                }
                            }
                        }
                        Err(err) => {
                            reward_queue::record_failure(
                                self.store.as_ref(),
                                &self.config.reward,
                                &entry,
                                now_ts,
                                &err.to_string(),
                            )
                            .await?;
                            stats.failed += 1;
                        }
                    }
                }
            }
        }

        Ok(stats)
    }

    fn rehydrate_learners(&self, snapshot: &BanditSnapshot, user_id: &str) -> UserLearners {
        let mut learners =
            UserLearners::new(&self.config.linucb, &self.config.ensemble, self.config.feature.dimension);

        if let Some(raw) = &snapshot.linucb_blob {
            match blob::decode_linucb(raw) {
                Ok((dimension, arms)) if dimension == self.config.feature.dimension => {
                    for arm in arms {
                        learners.linucb.import_arm(arm.action_index, arm.a, arm.b);
                    }
                }
                _ => {
                    self.sink.record(user_id, Telemetry::ModelFallback { reason: "linucb_blob_unusable" });
                    learners.linucb =
                        LinUcbModel::new(self.config.feature.dimension, self.config.linucb.alpha, self.config.linucb.lambda);
                }
            }
        }

        if let Some(persisted) = &snapshot.ensemble {
            learners.ensemble = EnsembleWeights::from_persisted(
                persisted,
                self.config.ensemble.learning_rate,
                self.config.ensemble.reward_history_size,
            );
        }

        for _ in 0..snapshot.interaction_count {
            learners.coldstart.record_interaction();
        }

        learners
    }
}

/// `now - lastSessionEnd` derived purely from the caller's previous
/// timestamp; `session_duration_ms` is the gap since the prior event as a
/// proxy for time-in-session (word/session metadata beyond the raw event
/// stream is out of scope, `spec.md` §1).
fn derive_temporal(now_ts: i64, prior_ts: i64) -> TemporalContext {
    let dt = Utc.timestamp_millis_opt(now_ts).single().unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap());
    let session_duration_ms = if prior_ts > 0 { (now_ts - prior_ts).max(0) as f64 } else { 0.0 };
    TemporalContext {
        hour_of_day: dt.hour() as u8,
        day_of_week: dt.weekday().num_days_from_monday() as u8,
        session_duration_ms,
    }
}

fn review_ages_days(trace: &WordMemoryTrace, now_ts: i64) -> Vec<f64> {
    trace.reviews.iter().map(|r| ((now_ts - r.ts).max(0) as f64) / DAY_MS).collect()
}

fn word_age_days(trace: &WordMemoryTrace, now_ts: i64) -> f64 {
    trace
        .reviews
        .front()
        .map(|r| ((now_ts - r.ts).max(0) as f64) / DAY_MS)
        .unwrap_or(0.0)
}

fn derive_recent_performance(
    trace: &WordMemoryTrace,
    srs: &SrsWordState,
    event: &RawEvent,
) -> RecentPerformance {
    const WINDOW: usize = 5;
    let accuracy = if trace.reviews.is_empty() {
        0.5
    } else {
        let take = WINDOW.min(trace.reviews.len());
        let correct = trace.reviews.iter().rev().take(take).filter(|r| r.correct).count();
        correct as f64 / take as f64
    };
    RecentPerformance {
        accuracy,
        avg_response_time_ms: event.response_time_ms,
        retry_rate: if event.retry_count > 0 { 1.0 } else { 0.0 },
        hint_rate: if event.hint_used { 1.0 } else { 0.0 },
        streak: srs.consecutive_correct,
    }
}

fn modeling_inputs_from_event(event: &RawEvent) -> ModelingInputs {
    ModelingInputs {
        attention: crate::modeling::attention::AttentionFeatures {
            rt_mean: (event.response_time_ms / 6000.0).min(1.0),
            rt_cv: 0.0,
            pace_cv: 0.0,
            pause: (event.pause_count as f64 / 10.0).min(1.0),
            switch: (event.switch_count as f64 / 5.0).min(1.0),
            drift: 0.0,
            interaction_density: event.interaction_density.clamp(0.0, 1.0),
            focus_loss: (event.focus_loss_duration_ms / 60_000.0).min(1.0),
        },
        fatigue: crate::modeling::fatigue::FatigueFeatures {
            error_rate_trend: if event.is_correct { 0.0 } else { 1.0 },
            rt_increase_rate: (event.response_time_ms / 4000.0 - 1.0).clamp(0.0, 1.0),
            repeat_errors: event.retry_count as f64,
        },
        cognitive: crate::modeling::CognitiveInputWrapper {
            accuracy: if event.is_correct { 1.0 } else { 0.0 },
            avg_response_time_ms: event.response_time_ms,
        },
        motivation: crate::modeling::motivation::MotivationEvent {
            is_correct: event.is_correct,
            is_quit: event.is_quit,
            self_rating: event.self_rating,
        },
    }
}

/// Advances SRS state with a simplified SM-2-style update: a correct answer
/// grows the interval by the ease factor and raises mastery; an incorrect
/// answer resets the streak and interval without destroying accumulated
/// ease. Not derived from the teacher (its SRS lived in `amas`'s content
/// layer, out of this engine's scope); written from the standard algorithm.
fn advance_srs(trace: &mut WordMemoryTrace, srs: &mut SrsWordState, event: &RawEvent, now_ts: i64) {
    trace.record(ReviewEvent {
        ts: now_ts,
        correct: event.is_correct,
        response_time_ms: event.response_time_ms,
    });

    if event.is_correct {
        srs.consecutive_correct += 1;
        srs.ease_factor = (srs.ease_factor + 0.1).min(3.0);
        srs.mastery_level = (srs.mastery_level + 1).min(5);
        srs.current_interval_days = if srs.current_interval_days <= 0.0 {
            1.0
        } else {
            (srs.current_interval_days * srs.ease_factor).min(365.0)
        };
    } else {
        srs.consecutive_correct = 0;
        srs.ease_factor = (srs.ease_factor - 0.2).max(1.3);
        srs.mastery_level = srs.mastery_level.saturating_sub(1);
        srs.current_interval_days = 1.0;
    }

    srs.recent_outcomes.push_back(event.is_correct);
    while srs.recent_outcomes.len() > 20 {
        srs.recent_outcomes.pop_front();
    }
    srs.next_review_ts = now_ts + (srs.current_interval_days * DAY_MS) as i64;
    srs.state = match srs.mastery_level {
        0 => SrsState::New,
        1 | 2 => SrsState::Learning,
        3 | 4 => SrsState::Reviewing,
        _ => SrsState::Mastered,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::fake_store::InMemoryStore;

    fn sample_event(word_id: &str, session_id: &str, is_correct: bool, ts: i64) -> RawEvent {
        RawEvent {
            is_correct,
            response_time_ms: 2000.0,
            dwell_time_ms: 1500.0,
            retry_count: 0,
            hint_used: false,
            paused_time_ms: 0.0,
            word_id: word_id.to_string(),
            pause_count: 0,
            switch_count: 0,
            focus_loss_duration_ms: 0.0,
            interaction_density: 0.6,
            timestamp: ts,
            is_quit: false,
            session_id: session_id.to_string(),
            self_rating: None,
        }
    }

    fn engine() -> Engine {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        Engine::new(store, EngineConfig::default())
    }

    #[tokio::test]
    async fn cold_start_event_produces_a_decision_with_bounded_state() {
        let engine = engine();
        let result = engine
            .process_event("u1", sample_event("w1", "s1", true, 1_700_000_000_000), 1_700_000_000_000)
            .await
            .unwrap();
        assert!(result.user_state.attention >= 0.6 && result.user_state.attention <= 0.8);
        assert!(result.user_state.fatigue <= 0.2);
        assert!(result.user_state.conf <= 0.6);
    }

    #[tokio::test]
    async fn reward_application_is_idempotent() {
        let engine = engine();
        let result = engine
            .process_event("u2", sample_event("w1", "s1", true, 0), 0)
            .await
            .unwrap();

        let first = engine.apply_delayed_reward("u2", &result.decision_id, 0.4, DAY_MS as i64).await.unwrap();
        let snapshot_after_first = engine.store.load_bandit_snapshot("u2").await.unwrap();

        let second = engine.apply_delayed_reward("u2", &result.decision_id, 0.4, DAY_MS as i64).await.unwrap();
        let snapshot_after_second = engine.store.load_bandit_snapshot("u2").await.unwrap();

        assert!(first);
        assert!(second);
        assert_eq!(snapshot_after_first.linucb_blob, snapshot_after_second.linucb_blob);
    }

    #[tokio::test]
    async fn explain_returns_not_found_for_unknown_decision() {
        let engine = engine();
        let err = engine.explain("missing").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_user_state_returns_default_for_new_user() {
        let engine = engine();
        let state = engine.get_user_state("never-seen").await.unwrap();
        assert_eq!(state.ts, 0);
        assert_eq!(state.conf, 0.5);
    }
}
