use thiserror::Error;

/// Error taxonomy for the decision engine's public API.
///
/// Computation-layer failures (a scorer producing a non-finite value, a
/// non-SPD ridge matrix that even the regularised fallback can't recover)
/// are never surfaced here: the engine always returns a decision, falling
/// back to neutral defaults and recording a `ComputationRecovered`
/// telemetry event instead. Only conditions the caller must react to reach
/// this enum.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InputError(String),

    #[error("feature vector mismatch: expected dimension {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("lock timeout acquiring user '{user_id}' after {waited_ms}ms")]
    LockTimeout { user_id: String, waited_ms: u64 },

    #[error("model load error: {0}")]
    ModelLoadError(String),

    #[error("model corrupt: {0}")]
    ModelCorrupt(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Whether retrying the same call without caller-side changes is plausible.
    /// Mirrors the operational/internal split the teacher's `AppError` used to
    /// decide what detail to expose, without any HTTP coupling.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout { .. } | EngineError::PersistenceError(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::PersistenceError(err.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::PersistenceError(err.to_string())
    }
}
