//! Persistence layer: a `Store` trait over the single relational backing
//! store plus an optional read-through cache, matching
//! `SPEC_FULL.md`'s AMBIENT STACK decision to carry only one relational
//! store (no Postgres/SQLite dual-write, unlike the teacher's `db::`
//! module — see `DESIGN.md` "Dropped from the teacher"). The `Store` trait
//! itself has no teacher equivalent; it exists so control/engine.rs is
//! testable against a fake without a live Postgres, following the broader
//! example pack's convention of `async_trait`-based storage seams.

pub mod blob;
pub mod cache;
/// In-memory `Store`. Built for this crate's own unit tests, and additionally
/// exposed (unit tests always compile it; external callers need the
/// `test-util` feature) so the `tests/` integration suite can exercise a real
/// `Engine` — including the per-user lock and linearizability properties of
/// `spec.md` §5/§8 — without standing up Postgres.
#[cfg(any(test, feature = "test-util"))]
pub mod fake_store;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::error::EngineError;
use crate::learning::ensemble::PersistedEnsemble;
use crate::types::{
    DecisionRecord, FeatureVector, RewardQueueEntry, RewardStatus, SrsWordState, UserState,
    WordMemoryTrace,
};

/// One user's persisted bandit state: the LinUCB arm blob plus the
/// ensemble's weights/reward-history snapshot. Stored and loaded together
/// since they are restored together at the start of every `process_event`.
#[derive(Debug, Clone, Default)]
pub struct BanditSnapshot {
    pub linucb_blob: Option<Vec<u8>>,
    pub ensemble: Option<PersistedEnsemble>,
    /// Number of `process_event` calls seen for this user, tracked
    /// independently of the ridge model so the cold-start scorer's probe
    /// phase survives a process restart (`spec.md` §4.5 step 4:
    /// "exploration-time counts only").
    pub interaction_count: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_user_state(&self, user_id: &str) -> Result<Option<UserState>, EngineError>;
    async fn save_user_state(&self, user_id: &str, state: &UserState) -> Result<(), EngineError>;

    async fn load_bandit_snapshot(&self, user_id: &str) -> Result<BanditSnapshot, EngineError>;
    async fn save_linucb_blob(&self, user_id: &str, blob: &[u8]) -> Result<(), EngineError>;
    async fn save_ensemble(
        &self,
        user_id: &str,
        ensemble: &PersistedEnsemble,
    ) -> Result<(), EngineError>;
    async fn save_interaction_count(&self, user_id: &str, count: u64) -> Result<(), EngineError>;

    async fn save_decision_record(&self, record: &DecisionRecord) -> Result<(), EngineError>;
    async fn load_decision_record(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionRecord>, EngineError>;

    async fn save_feature_vector(
        &self,
        decision_id: &str,
        user_id: &str,
        session_id: &str,
        vector: &FeatureVector,
    ) -> Result<(), EngineError>;
    async fn load_feature_vector(
        &self,
        decision_id: &str,
    ) -> Result<Option<FeatureVector>, EngineError>;

    async fn enqueue_reward(&self, entry: &RewardQueueEntry) -> Result<RewardQueueEntry, EngineError>;
    async fn claim_pending_rewards(
        &self,
        now_ts: i64,
        limit: i64,
    ) -> Result<Vec<RewardQueueEntry>, EngineError>;
    async fn complete_reward(&self, id: &str) -> Result<(), EngineError>;
    async fn fail_reward(
        &self,
        id: &str,
        error: &str,
        next_due_ts: Option<i64>,
        expire: bool,
    ) -> Result<(), EngineError>;
    async fn load_reward_by_decision_id(
        &self,
        decision_id: &str,
    ) -> Result<Option<RewardQueueEntry>, EngineError>;

    async fn load_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<SrsWordState>, EngineError>;
    async fn save_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
        state: &SrsWordState,
    ) -> Result<(), EngineError>;

    async fn load_word_trace(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<WordMemoryTrace>, EngineError>;
    async fn save_word_trace(
        &self,
        user_id: &str,
        trace: &WordMemoryTrace,
    ) -> Result<(), EngineError>;
}

/// Single-Postgres-pool implementation. Schema is created idempotently on
/// `new`, following the teacher's `db::migrate::run_migrations`
/// `CREATE TABLE IF NOT EXISTS` convention, simplified to one inline
/// statement set since this crate owns a handful of tables rather than the
/// teacher's full application schema.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "engine_user_states" (
                "user_id" TEXT PRIMARY KEY,
                "state" JSONB NOT NULL,
                "updated_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS "engine_bandit_models" (
                "user_id" TEXT PRIMARY KEY,
                "linucb_blob" BYTEA,
                "ensemble" JSONB,
                "interaction_count" BIGINT NOT NULL DEFAULT 0,
                "updated_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS "engine_decision_records" (
                "decision_id" TEXT PRIMARY KEY,
                "user_id" TEXT NOT NULL,
                "session_id" TEXT NOT NULL,
                "record" JSONB NOT NULL,
                "created_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS "engine_feature_vectors" (
                "decision_id" TEXT PRIMARY KEY,
                "user_id" TEXT NOT NULL,
                "session_id" TEXT NOT NULL,
                "vector" JSONB NOT NULL,
                "created_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS "engine_reward_queue" (
                "id" TEXT PRIMARY KEY,
                "user_id" TEXT NOT NULL,
                "decision_id" TEXT NOT NULL,
                "idempotency_key" TEXT NOT NULL UNIQUE,
                "reward" JSONB NOT NULL,
                "due_ts" BIGINT NOT NULL,
                "status" TEXT NOT NULL,
                "attempt" INTEGER NOT NULL DEFAULT 0,
                "last_error" TEXT,
                "created_ts" BIGINT NOT NULL,
                "updated_ts" BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS "engine_reward_queue_due_ts_idx"
                ON "engine_reward_queue" ("status", "due_ts");
            CREATE TABLE IF NOT EXISTS "engine_srs_word_states" (
                "user_id" TEXT NOT NULL,
                "word_id" TEXT NOT NULL,
                "state" JSONB NOT NULL,
                PRIMARY KEY ("user_id", "word_id")
            );
            CREATE TABLE IF NOT EXISTS "engine_word_memory_traces" (
                "user_id" TEXT NOT NULL,
                "word_id" TEXT NOT NULL,
                "trace" JSONB NOT NULL,
                PRIMARY KEY ("user_id", "word_id")
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn status_str(status: RewardStatus) -> &'static str {
    match status {
        RewardStatus::Pending => "PENDING",
        RewardStatus::Processing => "PROCESSING",
        RewardStatus::Done => "DONE",
        RewardStatus::Failed => "FAILED",
        RewardStatus::Expired => "EXPIRED",
    }
}

fn status_from_str(s: &str) -> RewardStatus {
    match s {
        "PROCESSING" => RewardStatus::Processing,
        "DONE" => RewardStatus::Done,
        "FAILED" => RewardStatus::Failed,
        "EXPIRED" => RewardStatus::Expired,
        _ => RewardStatus::Pending,
    }
}

fn row_to_reward_entry(row: &sqlx::postgres::PgRow) -> Result<RewardQueueEntry, EngineError> {
    let reward_value: serde_json::Value =
        row.try_get("reward").map_err(|e| EngineError::PersistenceError(e.to_string()))?;
    let reward = serde_json::from_value(reward_value)
        .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| EngineError::PersistenceError(e.to_string()))?;
    Ok(RewardQueueEntry {
        id: row.try_get("id").map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        decision_id: row
            .try_get("decision_id")
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        idempotency_key: row
            .try_get("idempotency_key")
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        reward,
        due_ts: row.try_get("due_ts").map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        status: status_from_str(&status),
        attempt: row.try_get::<i32, _>("attempt").map_err(|e| EngineError::PersistenceError(e.to_string()))? as u32,
        last_error: row.try_get("last_error").ok(),
        created_ts: row
            .try_get("created_ts")
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?,
        updated_ts: row
            .try_get("updated_ts")
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?,
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn load_user_state(&self, user_id: &str) -> Result<Option<UserState>, EngineError> {
        let row = sqlx::query(r#"SELECT "state" FROM "engine_user_states" WHERE "user_id" = $1"#)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("state")?;
                Ok(serde_json::from_value(value).ok())
            }
            None => Ok(None),
        }
    }

    async fn save_user_state(&self, user_id: &str, state: &UserState) -> Result<(), EngineError> {
        let value = serde_json::to_value(state)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_user_states" ("user_id", "state", "updated_at")
               VALUES ($1, $2, NOW())
               ON CONFLICT ("user_id") DO UPDATE SET "state" = $2, "updated_at" = NOW()"#,
        )
        .bind(user_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_bandit_snapshot(&self, user_id: &str) -> Result<BanditSnapshot, EngineError> {
        let row = sqlx::query(
            r#"SELECT "linucb_blob", "ensemble", "interaction_count"
               FROM "engine_bandit_models" WHERE "user_id" = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let linucb_blob: Option<Vec<u8>> = row.try_get("linucb_blob")?;
                let ensemble_value: Option<serde_json::Value> = row.try_get("ensemble")?;
                let ensemble = ensemble_value.and_then(|v| serde_json::from_value(v).ok());
                let interaction_count: i64 = row.try_get("interaction_count")?;
                Ok(BanditSnapshot { linucb_blob, ensemble, interaction_count: interaction_count.max(0) as u64 })
            }
            None => Ok(BanditSnapshot::default()),
        }
    }

    async fn save_linucb_blob(&self, user_id: &str, blob: &[u8]) -> Result<(), EngineError> {
        sqlx::query(
            r#"INSERT INTO "engine_bandit_models" ("user_id", "linucb_blob", "updated_at")
               VALUES ($1, $2, NOW())
               ON CONFLICT ("user_id") DO UPDATE SET "linucb_blob" = $2, "updated_at" = NOW()"#,
        )
        .bind(user_id)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_ensemble(
        &self,
        user_id: &str,
        ensemble: &PersistedEnsemble,
    ) -> Result<(), EngineError> {
        let value = serde_json::to_value(ensemble)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_bandit_models" ("user_id", "ensemble", "updated_at")
               VALUES ($1, $2, NOW())
               ON CONFLICT ("user_id") DO UPDATE SET "ensemble" = $2, "updated_at" = NOW()"#,
        )
        .bind(user_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_interaction_count(&self, user_id: &str, count: u64) -> Result<(), EngineError> {
        sqlx::query(
            r#"INSERT INTO "engine_bandit_models" ("user_id", "interaction_count", "updated_at")
               VALUES ($1, $2, NOW())
               ON CONFLICT ("user_id") DO UPDATE SET "interaction_count" = $2, "updated_at" = NOW()"#,
        )
        .bind(user_id)
        .bind(count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_decision_record(&self, record: &DecisionRecord) -> Result<(), EngineError> {
        let value = serde_json::to_value(record)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_decision_records"
                   ("decision_id", "user_id", "session_id", "record")
               VALUES ($1, $2, $3, $4)
               ON CONFLICT ("decision_id") DO UPDATE SET "record" = $4"#,
        )
        .bind(&record.decision_id)
        .bind(&record.user_id)
        .bind(&record.session_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_decision_record(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionRecord>, EngineError> {
        let row = sqlx::query(
            r#"SELECT "record" FROM "engine_decision_records" WHERE "decision_id" = $1"#,
        )
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("record")?;
                Ok(serde_json::from_value(value).ok())
            }
            None => Ok(None),
        }
    }

    async fn save_feature_vector(
        &self,
        decision_id: &str,
        user_id: &str,
        session_id: &str,
        vector: &FeatureVector,
    ) -> Result<(), EngineError> {
        let value = serde_json::to_value(vector)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_feature_vectors" ("decision_id", "user_id", "session_id", "vector")
               VALUES ($1, $2, $3, $4)
               ON CONFLICT ("decision_id") DO UPDATE SET "vector" = $4"#,
        )
        .bind(decision_id)
        .bind(user_id)
        .bind(session_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_feature_vector(
        &self,
        decision_id: &str,
    ) -> Result<Option<FeatureVector>, EngineError> {
        let row = sqlx::query(
            r#"SELECT "vector" FROM "engine_feature_vectors" WHERE "decision_id" = $1"#,
        )
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("vector")?;
                Ok(serde_json::from_value(value).ok())
            }
            None => Ok(None),
        }
    }

    async fn enqueue_reward(
        &self,
        entry: &RewardQueueEntry,
    ) -> Result<RewardQueueEntry, EngineError> {
        let reward_value = serde_json::to_value(&entry.reward)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        let row = sqlx::query(
            r#"INSERT INTO "engine_reward_queue"
                   ("id", "user_id", "decision_id", "idempotency_key", "reward",
                    "due_ts", "status", "attempt", "created_ts", "updated_ts")
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
               ON CONFLICT ("idempotency_key") DO NOTHING
               RETURNING "id", "user_id", "decision_id", "idempotency_key", "reward",
                         "due_ts", "status", "attempt", "last_error", "created_ts", "updated_ts""#,
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.decision_id)
        .bind(&entry.idempotency_key)
        .bind(reward_value)
        .bind(entry.due_ts)
        .bind(status_str(entry.status))
        .bind(entry.attempt as i32)
        .bind(entry.created_ts)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_reward_entry(&row),
            None => self
                .load_reward_by_decision_id(&entry.decision_id)
                .await?
                .ok_or_else(|| EngineError::PersistenceError("enqueue returned no row".into())),
        }
    }

    async fn claim_pending_rewards(
        &self,
        now_ts: i64,
        limit: i64,
    ) -> Result<Vec<RewardQueueEntry>, EngineError> {
        let rows = sqlx::query(
            r#"WITH claimed AS (
                   SELECT "id" FROM "engine_reward_queue"
                   WHERE "status" = 'PENDING' AND "due_ts" <= $1
                   ORDER BY "due_ts" ASC
                   LIMIT $2
                   FOR UPDATE SKIP LOCKED
               )
               UPDATE "engine_reward_queue" SET "status" = 'PROCESSING', "updated_ts" = $1
               WHERE "id" IN (SELECT "id" FROM claimed)
               RETURNING "id", "user_id", "decision_id", "idempotency_key", "reward",
                         "due_ts", "status", "attempt", "last_error", "created_ts", "updated_ts""#,
        )
        .bind(now_ts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_reward_entry).collect()
    }

    async fn complete_reward(&self, id: &str) -> Result<(), EngineError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"UPDATE "engine_reward_queue" SET "status" = 'DONE', "updated_ts" = $2 WHERE "id" = $1"#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_reward(
        &self,
        id: &str,
        error: &str,
        next_due_ts: Option<i64>,
        expire: bool,
    ) -> Result<(), EngineError> {
        let now = Utc::now().timestamp_millis();
        let status = if expire { "EXPIRED" } else { "PENDING" };
        sqlx::query(
            r#"UPDATE "engine_reward_queue"
               SET "status" = $2, "last_error" = $3, "attempt" = "attempt" + 1,
                   "due_ts" = COALESCE($4, "due_ts"), "updated_ts" = $5
               WHERE "id" = $1"#,
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(next_due_ts)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_reward_by_decision_id(
        &self,
        decision_id: &str,
    ) -> Result<Option<RewardQueueEntry>, EngineError> {
        let row = sqlx::query(
            r#"SELECT "id", "user_id", "decision_id", "idempotency_key", "reward",
                      "due_ts", "status", "attempt", "last_error", "created_ts", "updated_ts"
               FROM "engine_reward_queue" WHERE "decision_id" = $1"#,
        )
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_reward_entry).transpose()
    }

    async fn load_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<SrsWordState>, EngineError> {
        let row = sqlx::query(
            r#"SELECT "state" FROM "engine_srs_word_states" WHERE "user_id" = $1 AND "word_id" = $2"#,
        )
        .bind(user_id)
        .bind(word_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("state")?;
                Ok(serde_json::from_value(value).ok())
            }
            None => Ok(None),
        }
    }

    async fn save_srs_state(
        &self,
        user_id: &str,
        word_id: &str,
        state: &SrsWordState,
    ) -> Result<(), EngineError> {
        let value = serde_json::to_value(state)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_srs_word_states" ("user_id", "word_id", "state")
               VALUES ($1, $2, $3)
               ON CONFLICT ("user_id", "word_id") DO UPDATE SET "state" = $3"#,
        )
        .bind(user_id)
        .bind(word_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_word_trace(
        &self,
        user_id: &str,
        word_id: &str,
    ) -> Result<Option<WordMemoryTrace>, EngineError> {
        let row = sqlx::query(
            r#"SELECT "trace" FROM "engine_word_memory_traces" WHERE "user_id" = $1 AND "word_id" = $2"#,
        )
        .bind(user_id)
        .bind(word_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("trace")?;
                Ok(serde_json::from_value(value).ok())
            }
            None => Ok(None),
        }
    }

    async fn save_word_trace(
        &self,
        user_id: &str,
        trace: &WordMemoryTrace,
    ) -> Result<(), EngineError> {
        let value = serde_json::to_value(trace)
            .map_err(|e| EngineError::PersistenceError(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO "engine_word_memory_traces" ("user_id", "word_id", "trace")
               VALUES ($1, $2, $3)
               ON CONFLICT ("user_id", "word_id") DO UPDATE SET "trace" = $3"#,
        )
        .bind(user_id)
        .bind(&trace.word_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Derives a stable, lowercase-hex idempotency key for a decision id
/// (`spec.md` §6: "idempotencyKey is a hex digest").
pub fn idempotency_key(decision_id: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(decision_id.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_deterministic_hex() {
        let a = idempotency_key("decision-123");
        let b = idempotency_key("decision-123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_decisions_get_different_keys() {
        assert_ne!(idempotency_key("a"), idempotency_key("b"));
    }
}
