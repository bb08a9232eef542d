//! Fire-and-forget appender task.
//!
//! The engine pushes events into a bounded channel with `try_send`; this
//! task drains the channel and writes each event through the log. The
//! task exits when every sender is dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use signal::model::SignalEvent;

use crate::SignalLog;

pub fn spawn_appender(
    log: Arc<dyn SignalLog>,
    mut rx: mpsc::Receiver<SignalEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = log.append(&event).await {
                // Broadcast already happened; the event is lost to the
                // log but the live system keeps going.
                warn!(
                    event = event.name(),
                    signal_id = %event.signal().id,
                    error = %e,
                    "failed to append event to durable log"
                );
            }
        }
    })
}
