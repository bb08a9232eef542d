mod config;
mod listener;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;

use common::logger::init_logger;
use engine::engine::{BroadcastEngine, now_ms};
use engine::reaper;
use session::rate_limit::RateLimiter;
use session::registry::SessionRegistry;
use signal::store::SignalStore;
use storage::sqlite::SqliteSignalLog;
use storage::writer::spawn_appender;

use crate::config::AppConfig;

/// Connect the durable log and ensure its schema exists.
async fn init_signal_log(cfg: &AppConfig) -> anyhow::Result<Arc<SqliteSignalLog>> {
    let log = SqliteSignalLog::new(&cfg.database_url).await?;
    Ok(Arc::new(log))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("signal-server");

    let cfg = AppConfig::from_env();
    info!(port = cfg.port, max_connections = cfg.max_connections, "starting signal server");

    let log = init_signal_log(&cfg).await?;
    let (log_tx, log_rx) = mpsc::channel(cfg.log_queue_capacity);
    spawn_appender(log.clone(), log_rx);

    let engine = Arc::new(BroadcastEngine::new(
        cfg.engine_config(),
        SignalStore::new(cfg.store_config()),
        SessionRegistry::new(cfg.registry_config()),
        RateLimiter::new(cfg.rate_limits()),
        log,
        log_tx,
        now_ms(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper_handle = reaper::spawn(engine.clone(), cfg.reaper_interval_ms, shutdown_rx);

    let listener_handle = tokio::spawn(listener::run(engine, cfg.port, cfg.max_connections));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = reaper_handle.await;
    listener_handle.abort();

    Ok(())
}
