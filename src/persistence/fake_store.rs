//! In-memory `Store` used by this crate's own unit tests and, under the
//! `test-util` feature, by the `tests/` integration suite, so the
//! orchestration layer is exercised without a live Postgres. Mirrors
//! `PostgresStore`'s semantics (CAS claim via a single critical section
//! instead of `FOR UPDATE SKIP LOCKED`).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::learning::ensemble::PersistedEnsemble;
use crate::types::{
    DecisionRecord, FeatureVector, RewardQueueEntry, RewardStatus, SrsWordState, UserState,
    WordMemoryTrace,
};

use super::{BanditSnapshot, Store};

#[derive(Default)]
struct Inner {
    user_states: HashMap<String, UserState>,
    linucb_blobs: HashMap<String, Vec<u8>>,
    ensembles: HashMap<String, PersistedEnsemble>,
    interaction_counts: HashMap<String, u64>,
    decisions: HashMap<String, DecisionRecord>,
    feature_vectors: HashMap<String, FeatureVector>,
    rewards: HashMap<String, RewardQueueEntry>,
    srs: HashMap<(String, String), SrsWordState>,
    traces: HashMap<(String, String), WordMemoryTrace>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_user_state(&self, user_id: &str) -> Result<Option<UserState>, EngineError> {
        Ok(self.inner.lock().user_states.get(user_id).cloned())
    }

    async fn save_user_state(&self, user_id: &str, state: &UserState) -> Result<(), EngineError> {
        self.inner.lock().user_states.insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn load_bandit_snapshot(&self, user_id: &str) -> Result<BanditSnapshot, EngineError> {
        let inner = self.inner.lock();
        Ok(BanditSnapshot {
            linucb_blob: inner.linucb_blobs.get(user_id).cloned(),
            ensemble: inner.ensembles.get(user_id).cloned(),
            interaction_count: inner.interaction_counts.get(user_id).copied().unwrap_or(0),
        })
    }

    async fn save_linucb_blob(&self, user_id: &str, blob: &[u8]) -> Result<(), EngineError> {
        self.inner.lock().linucb_blobs.insert(user_id.to_string(), blob.to_vec());
        Ok(())
    }

    async fn save_ensemble(
        &self,
        user_id: &str,
        ensemble: &PersistedEnsemble,
    ) -> Result<(), EngineError> {
        self.inner.lock().ensembles.insert(user_id.to_string(), ensemble.clone());
        Ok(())
    }

    async fn save_interaction_count(&self, user_id: &str, count: u64) -> Result<(), EngineError> {
        self.inner.lock().interaction_counts.insert(user_id.to_string(), count);
        Ok(())
    }

    async fn save_decision_record(&self, record: &DecisionRecord) -> Result<(), EngineError> {
        self.inner.lock().decisions.insert(record.decision_id.clone(), record.clone());
        Ok(())
    }

    async fn load_decision_record(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionRecord>, EngineError> {
        Ok(self.inner.lock().decisions.get(decision_id).cloned())
    }

    async fn save_feature_vector(
        &self,
        decision_id: &str,
        _user_id: &str,
        _session_id: &str,
        vector: &FeatureVector,
    ) -> Result<(), EngineError> {
        self.inner.lock().feature_vectors.insert(decision_id.to_string(), vector.clone());
        Ok(())
    }

    async fn load_feature_vector(
        &self,
        decision_id: &str,
    ) -> Result<Option<FeatureVector>, EngineError> {
        Ok(self.inner.lock().feature_vectors.get(decision_id).cloned())
    }

    async fn enqueue_reward(
        &self,
        entry: &RewardQueueEntry,
    ) -> Result<RewardQueueEntry, EngineError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .rewards
            .values()
            .find(|e| e.idempotency_key == entry.idempotency_key)
        {
            return Ok(existing.clone());
        }
        inner.rewards.insert(entry.id.clone(), entry.clone());
        Ok(entry.clone())
    }

    async fn claim_pending_rewards(
        &self,
        now_ts: i64,
        limit: i64,
    ) -> Result<Vec<RewardQueueEntry>, EngineError> {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .rewards
            .values()
            .filter(|e| e.status == RewardStatus::Pending && e.due_ts <= now_ts)
            .take(limit.max(0) as usize)
            .map(|e| e.id.clone())
            .collect();
        let mut claimed = Vec::new();
        for id in ids {
            if let Some(entry) = inner.rewards.get_mut(&id) {
                entry.status = RewardStatus::Processing;
                entry.updated_ts = now_ts;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_reward(&self, id: &str) -> Result<(), EngineError> {
        if let Some(entry) = self.inner.lock().rewards.get_mut(id) {
            entry.status = RewardStatus::Done;
        }
        Ok(())
    }

    async fn fail_reward(
        &self,
        id: &str,
        error: &str,
        next_due_ts: Option<i64>,
        expire: bool,
    ) -> Result<(), EngineError> {
        if let Some(entry) = self.inner.lock().rewards.get_mut(id) {
            entry.attempt += 1;
            entry.last_error = Some(error.to_string());
            entry.status = if expire { RewardStatus::Expired } else { RewardStatus::Pending };
            if let Some(due) = next_due_ts {
                entry.due_ts = due;
            }
        }
        Ok(())
    }

    async fn load_reward_by_decision_id(
        &self,
        decision_id: &str,
    ) -> Result<Option<RewardQueueEntry>, EngineError> {
        Ok(self.inner.lock().rewards.values().find(|e| e.decision_id == decision_id).cloned())
    }

    async fn load_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<SrsWordState>, EngineError> {
        Ok(self.inner.lock().srs.get(&(user_id.to_string(), word_id.to_string())).cloned())
    }

    async fn save_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
        state: &SrsWordState,
    ) -> Result<(), EngineError> {
        self.inner.lock().srs.insert((user_id.to_string(), word_id.to_string()), state.clone());
        Ok(())
    }

    async fn load_word_trace(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<WordMemoryTrace>, EngineError> {
        Ok(self.inner.lock().traces.get(&(user_id.to_string(), word_id.to_string())).cloned())
    }

    async fn save_word_trace(
        &self,
        user_id: &str,
        trace: &WordMemoryTrace,
    ) -> Result<(), EngineError> {
        self.inner
            .lock()
            .traces
            .insert((user_id.to_string(), trace.word_id.clone()), trace.clone());
        Ok(())
    }
}
