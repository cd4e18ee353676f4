//! Domain entities shared across the engine's layers.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Cognitive sub-profile: working-memory capacity, processing speed and
/// response-time stability, each normalised to [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CognitiveProfile {
    pub mem: f64,
    pub speed: f64,
    pub stability: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self { mem: 0.5, speed: 0.5, stability: 0.5 }
    }
}

/// The learner's latent state, updated by the modeling layer after every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(rename = "A")]
    pub attention: f64,
    #[serde(rename = "F")]
    pub fatigue: f64,
    #[serde(rename = "C")]
    pub cognitive: CognitiveProfile,
    #[serde(rename = "M")]
    pub motivation: f64,
    pub conf: f64,
    pub ts: i64,
    /// Version of the perception layer's feature layout this state was last
    /// touched under; used to reject stale feature vectors (`FeatureMismatch`).
    pub feature_version: u32,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            attention: 0.7,
            fatigue: 0.0,
            cognitive: CognitiveProfile::default(),
            motivation: 0.5,
            conf: 0.5,
            ts: 0,
            feature_version: 1,
        }
    }
}

impl UserState {
    pub fn clamp(&mut self) {
        self.attention = clamp01(self.attention);
        self.fatigue = clamp01(self.fatigue);
        self.motivation = self.motivation.clamp(-1.0, 1.0);
        self.conf = clamp01(self.conf);
        self.cognitive.mem = clamp01(self.cognitive.mem);
        self.cognitive.speed = clamp01(self.cognitive.speed);
        self.cognitive.stability = clamp01(self.cognitive.stability);
    }

    /// Decays confidence for staleness; `elapsed_ms` since `ts`.
    pub fn decay_confidence(&mut self, elapsed_ms: i64, decay_per_hour: f64) {
        self.conf = decay_conf(self.conf, elapsed_ms, decay_per_hour);
    }
}

/// Staleness decay for `UserState.conf`: `conf * decay_per_hour ^ hours_elapsed`.
pub fn decay_conf(conf: f64, elapsed_ms: i64, decay_per_hour: f64) -> f64 {
    let hours = (elapsed_ms.max(0) as f64) / 3_600_000.0;
    clamp01(conf * decay_per_hour.powf(hours))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Mid,
    Hard,
}

impl Difficulty {
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Mid,
            Difficulty::Mid => Difficulty::Hard,
            Difficulty::Hard => Difficulty::Hard,
        }
    }

    pub fn easier(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Easy,
            Difficulty::Mid => Difficulty::Easy,
            Difficulty::Hard => Difficulty::Mid,
        }
    }
}

/// A point in the fixed action space (`spec.md` §4.4 guardrail table).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: Difficulty,
    pub batch_size: u32,
    pub hint_level: u8,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            interval_scale: 1.0,
            new_ratio: 0.2,
            difficulty: Difficulty::Mid,
            batch_size: 8,
            hint_level: 1,
        }
    }
}

pub const INTERVAL_SCALE_OPTIONS: [f64; 5] = [0.5, 0.8, 1.0, 1.2, 1.5];
pub const NEW_RATIO_OPTIONS: [f64; 4] = [0.1, 0.2, 0.3, 0.4];
pub const BATCH_SIZE_OPTIONS: [u32; 4] = [5, 8, 12, 16];
pub const HINT_LEVEL_OPTIONS: [u8; 3] = [0, 1, 2];

/// A dense feature vector produced by the perception layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
    pub feature_version: u32,
    pub ts: i64,
}

impl FeatureVector {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// A single raw interaction event as reported by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub is_correct: bool,
    pub response_time_ms: f64,
    pub dwell_time_ms: f64,
    pub retry_count: u32,
    pub hint_used: bool,
    pub paused_time_ms: f64,
    pub word_id: String,
    pub pause_count: u32,
    pub switch_count: u32,
    pub focus_loss_duration_ms: f64,
    pub interaction_density: f64,
    pub timestamp: i64,
    pub is_quit: bool,
    pub session_id: String,
    /// Session-start self-rating, if the client collected one; feeds the
    /// motivation tracker alongside accuracy/streak signals.
    #[serde(default)]
    pub self_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFactor {
    pub name: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailAdjustment {
    pub rule: String,
    pub field: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub accuracy: f64,
    pub speed: f64,
    pub stability: f64,
    pub retention: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionExplanation {
    pub factors: Vec<DecisionFactor>,
    pub guardrails_fired: Vec<GuardrailAdjustment>,
    pub ensemble_weights: Vec<(String, f64)>,
    pub reward_breakdown: Option<RewardBreakdown>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub value: f64,
    pub reason: String,
    pub ts: i64,
}

/// Append-only audit record for one `process_event` call (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_id: String,
    pub user_id: String,
    pub session_id: String,
    pub word_id: String,
    pub action_index: Option<u32>,
    pub strategy: StrategyParams,
    pub explanation: DecisionExplanation,
    pub state_snapshot: UserState,
    pub ts: i64,
    /// Which scorers proposed the action actually taken, captured at
    /// decision time so reward application can attribute the realized
    /// reward per-scorer instead of crediting the whole ensemble equally
    /// (`spec.md` §4.3). Absent on records predating this field.
    #[serde(default)]
    pub scorer_matches: Vec<(crate::learning::ensemble::ScorerKind, bool)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub user_state: UserState,
    pub strategy: StrategyParams,
    pub explanation: DecisionExplanation,
    pub decision_id: String,
    /// Set by the fatigue guardrail (`spec.md` §4.4) when `F > 0.8`.
    pub suggest_rest: bool,
}

/// SRS mastery state for a single word, per `spec.md` §3/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrsState {
    New,
    Learning,
    Reviewing,
    Mastered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsWordState {
    pub mastery_level: u8, // 0..=5
    pub consecutive_correct: u32,
    pub ease_factor: f64,
    pub current_interval_days: f64,
    pub next_review_ts: i64,
    pub state: SrsState,
    #[serde(default)]
    pub recent_outcomes: VecDeque<bool>,
}

impl Default for SrsWordState {
    fn default() -> Self {
        Self {
            mastery_level: 0,
            consecutive_correct: 0,
            ease_factor: 2.5,
            current_interval_days: 0.0,
            next_review_ts: 0,
            state: SrsState::New,
            recent_outcomes: VecDeque::new(),
        }
    }
}

/// A review timestamp/outcome pair feeding the ACT-R activation calculation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub ts: i64,
    pub correct: bool,
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordMemoryTrace {
    pub word_id: String,
    pub reviews: VecDeque<ReviewEvent>,
    pub summary_count: u64,
    pub summary_mean_interval_days: f64,
    pub summary_mean_outcome: f64,
}

impl WordMemoryTrace {
    pub const MAX_RETAINED: usize = 200;

    pub fn new(word_id: impl Into<String>) -> Self {
        Self {
            word_id: word_id.into(),
            reviews: VecDeque::new(),
            summary_count: 0,
            summary_mean_interval_days: 0.0,
            summary_mean_outcome: 0.0,
        }
    }

    /// Records a review, folding the oldest entry into the running summary
    /// once the retained window is exceeded, so bounding never silently
    /// drops information.
    pub fn record(&mut self, event: ReviewEvent) {
        self.reviews.push_back(event);
        if self.reviews.len() > Self::MAX_RETAINED {
            if let Some(dropped) = self.reviews.pop_front() {
                let n = self.summary_count as f64;
                let outcome = if dropped.correct { 1.0 } else { 0.0 };
                self.summary_mean_outcome = (self.summary_mean_outcome * n + outcome) / (n + 1.0);
                self.summary_count += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RewardStatus {
    Pending,
    Processing,
    Done,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardQueueEntry {
    pub id: String,
    pub user_id: String,
    pub decision_id: String,
    pub idempotency_key: String,
    pub reward: Reward,
    pub due_ts: i64,
    pub status: RewardStatus,
    pub attempt: u32,
    pub last_error: Option<String>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

#[derive(Debug, Clone, Copy)]
pub enum Telemetry {
    ModelFallback { reason: &'static str },
    GuardrailFired { rule: &'static str },
    RewardExpired { attempts: u32 },
    ComputationRecovered { reason: &'static str },
}

/// One-way sink the engine emits telemetry through; the engine never reads
/// back from it and never logs directly itself (`spec.md` §9).
pub trait DecisionSink: Send + Sync {
    fn record(&self, user_id: &str, event: Telemetry);
}

pub struct NullSink;

impl DecisionSink for NullSink {
    fn record(&self, _user_id: &str, _event: Telemetry) {}
}
