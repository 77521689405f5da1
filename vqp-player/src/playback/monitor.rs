//! Position monitor task
//!
//! Drives the coordinator's playback heartbeat on a fixed interval. The
//! tick does the actual work (cue checks, progress events, end
//! detection); this task only supplies the cadence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::playback::coordinator::QueueCoordinator;

/// Spawn the heartbeat task for a shared coordinator.
///
/// The interval comes from the coordinator's configuration. Abort the
/// returned handle to stop monitoring.
pub fn start_position_monitor(coordinator: Arc<Mutex<QueueCoordinator>>) -> JoinHandle<()> {
    let interval_ms = lock(&coordinator).config().tick_interval_ms.max(1);
    info!("position monitor started ({} ms interval)", interval_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            lock(&coordinator).tick();
        }
    })
}

fn lock(coordinator: &Arc<Mutex<QueueCoordinator>>) -> std::sync::MutexGuard<'_, QueueCoordinator> {
    match coordinator.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
