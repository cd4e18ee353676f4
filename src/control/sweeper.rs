//! Periodic sweeper (`spec.md` §4.5): claims due `RewardQueueEntry` rows and
//! applies their realized reward through [`Engine::sweep_once`]. Scheduling
//! shape is lifted from the teacher's `workers::WorkerManager` (a
//! `tokio_cron_scheduler::JobScheduler` job racing a `broadcast` shutdown
//! signal via `tokio::select!`), trimmed to the one job this engine has.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::engine::Engine;

pub struct Sweeper {
    scheduler: JobScheduler,
    shutdown_tx: broadcast::Sender<()>,
}

#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

impl Sweeper {
    /// `interval_ms` drives a second-granularity cron expression; anything
    /// under one second is rounded up so the schedule is always expressible.
    pub async fn start(engine: Arc<Engine>, interval_ms: u64) -> Result<Self, SweeperError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        let interval_secs = (interval_ms / 1000).max(1);
        let schedule = format!("0/{interval_secs} * * * * *");
        let shutdown_rx = shutdown_tx.subscribe();

        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let engine = Arc::clone(&engine);
            let mut rx = shutdown_rx.resubscribe();
            Box::pin(async move {
                tokio::select! {
                    _ = rx.recv() => {},
                    result = run_one_cycle(engine) => {
                        if let Err(err) = result {
                            error!(error = %err, "sweeper cycle failed");
                        }
                    }
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(interval_ms, "reward sweeper scheduled");

        Ok(Self { scheduler, shutdown_tx })
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.scheduler.shutdown().await {
            error!(error = %err, "error shutting down sweeper scheduler");
        }
    }
}

const CLAIM_BATCH_SIZE: i64 = 50;

async fn run_one_cycle(engine: Arc<Engine>) -> Result<(), crate::error::EngineError> {
    let now_ts = chrono::Utc::now().timestamp_millis();
    let stats = engine.sweep_once(now_ts, CLAIM_BATCH_SIZE).await?;
    if stats.applied > 0 || stats.failed > 0 {
        info!(applied = stats.applied, failed = stats.failed, "sweep cycle complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::persistence::fake_store::InMemoryStore;
    use crate::persistence::Store;

    #[tokio::test]
    async fn run_one_cycle_applies_due_rewards_via_the_shared_engine_path() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        let engine = Arc::new(Engine::new(store, EngineConfig::default()));

        let event = crate::types::RawEvent {
            is_correct: true,
            response_time_ms: 1200.0,
            dwell_time_ms: 1000.0,
            retry_count: 0,
            hint_used: false,
            paused_time_ms: 0.0,
            word_id: "w1".into(),
            pause_count: 0,
            switch_count: 0,
            focus_loss_duration_ms: 0.0,
            interaction_density: 0.6,
            timestamp: 0,
            is_quit: false,
            session_id: "s1".into(),
            self_rating: None,
        };
        engine.process_event("u1", event, 0).await.unwrap();

        let due = 24 * 60 * 60 * 1000 + 1;
        let stats = engine.sweep_once(due, CLAIM_BATCH_SIZE).await.unwrap();
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.failed, 0);
    }
}
