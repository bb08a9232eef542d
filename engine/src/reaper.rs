//! Cancellable periodic reaper task.
//!
//! Scheduled on a tokio interval rather than a blocking sleep loop; the
//! watch channel stops it deterministically on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{BroadcastEngine, now_ms};

pub fn spawn(
    engine: Arc<BroadcastEngine>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    engine.tick(now_ms()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("reaper stopped");
    })
}
