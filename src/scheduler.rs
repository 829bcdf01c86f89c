//! Periodic background work: aggregation, persistence and keep-alives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::aggregator::interval_start;
use crate::monitor::{now_ms, Monitor};
use crate::persist::StateFile;

/// How often each background task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Aggregation pass period; passes are aligned to interval boundaries.
    pub aggregation_interval: Duration,
    /// State file write period.
    pub persist_interval: Duration,
    /// Keep-alive period for connected viewers.
    pub heartbeat_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            aggregation_interval: Duration::from_secs(10 * 60),
            persist_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// Start the background loop.
///
/// Returns a handle that stops the loop; the loop also stops when the
/// handle is dropped.
pub fn start(monitor: Arc<Monitor>, store: StateFile, schedule: Schedule) -> BackgroundHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut aggregate_timer = tokio::time::interval_at(
            first_boundary(schedule.aggregation_interval),
            schedule.aggregation_interval,
        );
        // A late pass folds every interval it skipped, so bursts add nothing
        aggregate_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut persist_timer = tokio::time::interval(schedule.persist_interval);
        persist_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut heartbeat_timer = tokio::time::interval_at(
            Instant::now() + schedule.heartbeat_interval,
            schedule.heartbeat_interval,
        );
        heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            aggregation = ?schedule.aggregation_interval,
            persist = ?schedule.persist_interval,
            heartbeat = ?schedule.heartbeat_interval,
            "background tasks started"
        );

        loop {
            tokio::select! {
                _ = aggregate_timer.tick() => {
                    let report = monitor.aggregate_all(now_ms());
                    debug!(
                        folded = report.folded,
                        created = report.created,
                        merged = report.merged,
                        "aggregation pass"
                    );
                }
                _ = persist_timer.tick() => {
                    persist(&monitor, &store).await;
                }
                _ = heartbeat_timer.tick() => {
                    let reached = monitor.hub().heartbeat();
                    debug!(subscribers = reached, "heartbeat");
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("background tasks stopped");
    });

    BackgroundHandle { stop_tx, task }
}

/// Write the monitor's current state, logging any failure.
///
/// Returns whether the write succeeded.
pub async fn persist(monitor: &Monitor, store: &StateFile) -> bool {
    let state = monitor.persisted_state();
    match store.save(&state).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "failed to persist state");
            false
        }
    }
}

/// The instant at which the next aggregation interval begins.
fn first_boundary(interval: Duration) -> Instant {
    let interval_ms = (interval.as_millis() as u64).max(1);
    let now = now_ms();
    let next = interval_start(now, interval_ms) + interval_ms;
    Instant::now() + Duration::from_millis(next - now)
}

/// Handle for the background loop.
#[derive(Debug)]
pub struct BackgroundHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    /// Stop the loop and wait for it to finish its current step.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
