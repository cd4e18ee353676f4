//! Reward-queue helpers: computing `due_ts`/`idempotency_key` at enqueue
//! time and the backoff-then-expire schedule at fail time. A thin layer over
//! `persistence::Store`'s CRUD, mirroring the shape of the teacher's
//! `services/delayed_reward.rs` queue entry; the CAS claim itself is
//! `Store::claim_pending_rewards`, not this module's concern.

use uuid::Uuid;

use crate::config::RewardConfig;
use crate::error::EngineError;
use crate::persistence::{idempotency_key, Store};
use crate::types::{Reward, RewardQueueEntry, RewardStatus};

/// Enqueues a placeholder entry at decision time (`spec.md` §4.5 step 5).
/// The actual reward value is computed later, at sweep time, from
/// downstream signals; `reward` here is a zeroed placeholder overwritten on
/// completion.
pub async fn enqueue(
    store: &dyn Store,
    config: &RewardConfig,
    user_id: &str,
    decision_id: &str,
    now_ts: i64,
) -> Result<RewardQueueEntry, EngineError> {
    let entry = RewardQueueEntry {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        decision_id: decision_id.to_string(),
        idempotency_key: idempotency_key(decision_id),
        reward: Reward { value: 0.0, reason: "pending".into(), ts: now_ts },
        due_ts: now_ts.saturating_add(config.horizon_ms as i64),
        status: RewardStatus::Pending,
        attempt: 0,
        last_error: None,
        created_ts: now_ts,
        updated_ts: now_ts,
    };
    store.enqueue_reward(&entry).await
}

/// One minute, doubling per attempt, capped at 2^10 minutes (~17 hours) so a
/// pathological attempt count can't overflow `i64`.
pub fn backoff_ms(attempt: u32) -> i64 {
    const BASE_MS: i64 = 60_000;
    BASE_MS.saturating_mul(1i64 << attempt.min(10))
}

/// Records a failed reward application: re-queues with exponential backoff
/// until `max_attempts` is reached, then expires it for good
/// (`spec.md` §4.5 step 4).
pub async fn record_failure(
    store: &dyn Store,
    config: &RewardConfig,
    entry: &RewardQueueEntry,
    now_ts: i64,
    error: &str,
) -> Result<(), EngineError> {
    let next_attempt = entry.attempt + 1;
    if next_attempt >= config.max_attempts {
        store.fail_reward(&entry.id, error, None, true).await
    } else {
        let next_due = now_ts.saturating_add(backoff_ms(next_attempt));
        store.fail_reward(&entry.id, error, Some(next_due), false).await
    }
}

pub async fn record_success(store: &dyn Store, entry: &RewardQueueEntry) -> Result<(), EngineError> {
    store.complete_reward(&entry.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::fake_store::InMemoryStore;

    #[test]
    fn backoff_grows_and_is_capped() {
        let b0 = backoff_ms(0);
        let b1 = backoff_ms(1);
        let b20 = backoff_ms(20);
        assert!(b1 > b0);
        assert_eq!(backoff_ms(10), backoff_ms(20));
        assert!(b20 < i64::MAX / 2);
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_decision_id() {
        let store = InMemoryStore::default();
        let config = RewardConfig::default();
        let first = enqueue(&store, &config, "u1", "d1", 1000).await.unwrap();
        let second = enqueue(&store, &config, "u1", "d1", 1000).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn enqueue_sets_due_ts_at_horizon() {
        let store = InMemoryStore::default();
        let config = RewardConfig::default();
        let entry = enqueue(&store, &config, "u1", "d1", 1_000).await.unwrap();
        assert_eq!(entry.due_ts, 1_000 + config.horizon_ms as i64);
        assert_eq!(entry.status, RewardStatus::Pending);
    }

    #[tokio::test]
    async fn exhausting_attempts_expires_instead_of_retrying() {
        let store = InMemoryStore::default();
        let config = RewardConfig { max_attempts: 1, ..RewardConfig::default() };
        let entry = enqueue(&store, &config, "u1", "d1", 0).await.unwrap();
        record_failure(&store, &config, &entry, 0, "boom").await.unwrap();
        let reloaded = store.load_reward_by_decision_id("d1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, RewardStatus::Expired);
    }
}
