//! Exercises the property that justifies the per-user FIFO lock
//! (`danci_engine::control::lock::UserLockTable`, `spec.md` §4.5/§5): a
//! concurrent run of `process_event`/`apply_delayed_reward` against one
//! user must be equivalent to *some* serial interleaving of those same
//! calls, not just to program order. Rather than assert against a
//! hand-picked serial schedule, this records the interleaving a concurrent
//! run actually settled on (completion order, since each call only returns
//! once its critical section has run to completion) and replays exactly
//! that schedule one call at a time against a fresh store. `spec.md` §8
//! scenario 4 puts the tolerance between the two at 1e-9 absolute.

use std::sync::Arc;

use danci_engine::config::EngineConfig;
use danci_engine::persistence::blob::{decode_linucb, ArmBlob};
use danci_engine::persistence::fake_store::InMemoryStore;
use danci_engine::persistence::Store;
use danci_engine::types::RawEvent;
use danci_engine::Engine;

const TOLERANCE: f64 = 1e-9;

fn sample_event(word_id: &str, session_id: &str, ts: i64, correct: bool) -> RawEvent {
    RawEvent {
        is_correct: correct,
        response_time_ms: 1200.0,
        dwell_time_ms: 2100.0,
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

/// One completed call against a user, in the order it actually finished.
#[derive(Clone, Debug)]
enum LogEntry {
    Event { chain: usize, word_id: String, session_id: String, ts: i64, correct: bool },
    Reward { chain: usize, reward: f64, ts: i64 },
}

/// Runs one chain's rounds strictly in order (each round's reward call
/// waits on that same round's decision), pushing a log entry the instant
/// each call returns. Multiple chains for the same user run concurrently
/// via separate spawned tasks; the shared, mutex-guarded log is what
/// captures the schedule the lock actually produced.
async fn run_chain(
    engine: Arc<Engine>,
    user_id: String,
    chain: usize,
    rounds: Vec<(String, String, bool, f64)>,
    log: Arc<tokio::sync::Mutex<Vec<LogEntry>>>,
) {
    for (i, (word_id, session_id, correct, reward)) in rounds.into_iter().enumerate() {
        let ts = 1_000_000 + (chain as i64) * 100_000 + (i as i64) * 1_000;
        let result = engine
            .process_event(&user_id, sample_event(&word_id, &session_id, ts, correct), ts)
            .await
            .unwrap();
        log.lock().await.push(LogEntry::Event {
            chain,
            word_id: word_id.clone(),
            session_id: session_id.clone(),
            ts,
            correct,
        });

        let reward_ts = ts + 500;
        engine
            .apply_delayed_reward(&user_id, &result.decision_id, reward, reward_ts)
            .await
            .unwrap();
        log.lock().await.push(LogEntry::Reward { chain, reward, ts: reward_ts });
    }
}

async fn final_arms(store: &InMemoryStore, user_id: &str) -> Vec<ArmBlob> {
    let snapshot = store.load_bandit_snapshot(user_id).await.unwrap();
    let mut arms = match snapshot.linucb_blob {
        Some(bytes) => decode_linucb(&bytes).unwrap().1,
        None => Vec::new(),
    };
    arms.sort_by_key(|a| a.action_index);
    arms
}

fn assert_arms_close(a: &[ArmBlob], b: &[ArmBlob]) {
    assert_eq!(a.len(), b.len(), "arm count diverged between concurrent and serial replay");
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.action_index, y.action_index);
        assert_eq!(x.a.len(), y.a.len());
        assert_eq!(x.b.len(), y.b.len());
        for (u, v) in x.a.iter().zip(y.a.iter()) {
            assert!((u - v).abs() <= TOLERANCE, "A entry diverged: {u} vs {v}");
        }
        for (u, v) in x.b.iter().zip(y.b.iter()) {
            assert!((u - v).abs() <= TOLERANCE, "b entry diverged: {u} vs {v}");
        }
    }
}

fn rounds_for_chain(chain: usize, n: usize) -> Vec<(String, String, bool, f64)> {
    (0..n)
        .map(|i| {
            let word_id = format!("w{}", (chain + i) % 3);
            let session_id = format!("s{chain}");
            let correct = (chain + i) % 2 == 0;
            let reward = ((chain as f64) * 0.37 + (i as f64) * 0.11).sin();
            (word_id, session_id, correct, reward)
        })
        .collect()
}

/// Replays a recorded log serially: each chain keeps track of the
/// decision_id its own most recent `Event` entry produced, since the log
/// doesn't carry the original (run-specific) UUIDs across stores.
async fn replay_serially(user_id: &str, log: &[LogEntry]) -> InMemoryStore {
    let shared = Arc::new(InMemoryStore::default());
    let engine = Engine::new(shared.clone(), EngineConfig::default());

    let mut last_decision: std::collections::HashMap<usize, String> = std::collections::HashMap::new();
    for entry in log {
        match entry {
            LogEntry::Event { chain, word_id, session_id, ts, correct } => {
                let result = engine
                    .process_event(user_id, sample_event(word_id, session_id, *ts, *correct), *ts)
                    .await
                    .unwrap();
                last_decision.insert(*chain, result.decision_id);
            }
            LogEntry::Reward { chain, reward, ts } => {
                let decision_id = last_decision.get(chain).expect("reward before event in log");
                engine.apply_delayed_reward(user_id, decision_id, *reward, *ts).await.unwrap();
            }
        }
    }

    drop(engine);
    Arc::try_unwrap(shared).unwrap_or_else(|_| panic!("store still shared after replay"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_interleaving_matches_its_own_serial_replay() {
    let user_id = "linearizability-user".to_string();
    let store = Arc::new(InMemoryStore::default());
    let engine = Arc::new(Engine::new(store.clone(), EngineConfig::default()));
    let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for chain in 0..4 {
        let engine = engine.clone();
        let user_id = user_id.clone();
        let log = log.clone();
        let rounds = rounds_for_chain(chain, 5);
        handles.push(tokio::spawn(run_chain(engine, user_id, chain, rounds, log)));
    }
    for h in handles {
        h.await.unwrap();
    }

    let concurrent_arms = final_arms(&store, &user_id).await;

    let recorded_log = log.lock().await.clone();
    assert_eq!(recorded_log.len(), 4 * 5 * 2, "expected one Event + one Reward per round");

    let replayed_store = replay_serially(&user_id, &recorded_log).await;
    let serial_arms = final_arms(&replayed_store, &user_id).await;

    assert_arms_close(&concurrent_arms, &serial_arms);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_users_never_contend_and_each_matches_its_own_replay() {
    let store = Arc::new(InMemoryStore::default());
    let engine = Arc::new(Engine::new(store.clone(), EngineConfig::default()));

    let users = ["user-a".to_string(), "user-b".to_string(), "user-c".to_string()];
    let mut handles = Vec::new();
    let mut logs = Vec::new();
    for user_id in &users {
        let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        logs.push(log.clone());
        for chain in 0..2 {
            let engine = engine.clone();
            let user_id = user_id.clone();
            let log = log.clone();
            let rounds = rounds_for_chain(chain, 3);
            handles.push(tokio::spawn(run_chain(engine, user_id, chain, rounds, log)));
        }
    }
    for h in handles {
        h.await.unwrap();
    }

    for (user_id, log) in users.iter().zip(logs.iter()) {
        let concurrent_arms = final_arms(&store, user_id).await;
        let recorded_log = log.lock().await.clone();
        let replayed_store = replay_serially(user_id, &recorded_log).await;
        let serial_arms = final_arms(&replayed_store, user_id).await;
        assert_arms_close(&concurrent_arms, &serial_arms);
    }
}
