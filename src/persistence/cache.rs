//! Optional Redis read-through cache accelerating `get_user_state`/`explain`
//! reads (`SPEC_FULL.md` §1). Cache misses and outages always fall back to
//! the store; a cache failure never surfaces as a user-visible error.
//! Ported from the teacher's `cache::RedisCache`, trimmed to the two read
//! paths this crate actually accelerates.

use std::time::Duration;

use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

const TTL_JITTER_RATIO: f64 = 0.1;

#[derive(Clone)]
pub struct ReadThroughCache {
    connection: MultiplexedConnection,
}

impl ReadThroughCache {
    pub fn new(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self::new(connection))
    }

    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.connection.clone();
        let payload: Option<String> = conn.get(key).await.ok()?;
        payload.and_then(|p| serde_json::from_str(&p).ok())
    }

    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize,
    {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(_) => return,
        };
        let mut conn = self.connection.clone();
        if ttl.is_zero() {
            let _: Result<(), _> = conn.set(key, payload).await;
        } else {
            let ttl = apply_ttl_jitter(ttl);
            let _: Result<(), _> = conn.set_ex(key, payload, ttl.as_secs().max(1)).await;
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let mut conn = self.connection.clone();
        let _: Result<u64, _> = conn.del(key).await;
    }
}

fn apply_ttl_jitter(ttl: Duration) -> Duration {
    let base_ms = ttl.as_millis() as f64;
    let mut rng = rand::rng();
    let factor = rng.random_range(1.0 - TTL_JITTER_RATIO..=1.0 + TTL_JITTER_RATIO);
    Duration::from_millis((base_ms * factor).round().max(1.0) as u64)
}

pub fn user_state_key(user_id: &str) -> String {
    format!("engine:user_state:{user_id}")
}

pub fn explanation_key(decision_id: &str) -> String {
    format!("engine:explanation:{decision_id}")
}
