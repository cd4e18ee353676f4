//! Standalone sweeper process. Ported from the teacher's `main.rs` startup
//! skeleton (config → tracing → store → engine → workers → graceful
//! shutdown), minus the HTTP server: this crate has no transport, so the
//! binary's only job is to host `control::sweeper::Sweeper` until signalled
//! to stop.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use danci_engine::config::EngineConfig;
use danci_engine::control::sweeper::Sweeper;
use danci_engine::logging;
use danci_engine::persistence::cache::ReadThroughCache;
use danci_engine::persistence::{PostgresStore, Store};
use danci_engine::Engine;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _file_log_guard = logging::init_tracing(&log_level);

    let config = EngineConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    let store = PostgresStore::new(pool);
    store.ensure_schema().await.expect("failed to ensure engine schema");
    let store: Arc<dyn Store> = Arc::new(store);

    let mut engine = Engine::new(store, config.clone());
    if let Ok(redis_url) = std::env::var("REDIS_URL") {
        match ReadThroughCache::connect(&redis_url).await {
            Ok(cache) => {
                tracing::info!("Redis cache connected");
                engine = engine.with_cache(cache);
            }
            Err(err) => tracing::warn!(error = %err, "Redis cache not initialized"),
        }
    }
    let engine = Arc::new(engine);

    let sweeper = Sweeper::start(Arc::clone(&engine), config.reward.sweep_interval_ms)
        .await
        .expect("failed to start sweeper");

    tracing::info!("danci-sweeper running");
    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping sweeper");

    sweeper.stop().await;
    tracing::info!("sweeper stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
