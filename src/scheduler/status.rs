//! Status aggregation and the periodic status monitor.

use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::handle::SchedulerHandle;
use super::types::SchedulerState;
use crate::core::types::JobId;

/// Default interval of the status monitor.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time view of everything the scheduler is tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub scheduler_running: bool,
    pub state: SchedulerState,
    pub manual_running: Vec<String>,
    pub manual_unresponsive: Vec<String>,
    pub scheduled_running: Vec<JobId>,
    pub job_count: usize,
    pub job_ids: Vec<JobId>,
    pub pool_capacity: usize,
    pub pool_available: usize,
}

impl StatusView {
    /// Whether any manual or scheduled work is in flight.
    pub fn has_active_work(&self) -> bool {
        !self.manual_running.is_empty()
            || !self.manual_unresponsive.is_empty()
            || !self.scheduled_running.is_empty()
    }
}

/// Snapshot of `handle`, or the empty not-running view when there is none.
pub async fn snapshot(handle: Option<&SchedulerHandle>) -> StatusView {
    match handle {
        Some(handle) => handle.snapshot().await,
        None => StatusView::default(),
    }
}

/// Log active work every `interval` until the scheduler stops.
pub fn spawn_monitor(handle: SchedulerHandle, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let view = handle.snapshot().await;
            if view.state == SchedulerState::Stopped {
                tracing::debug!("Scheduler stopped, status monitor exiting");
                break;
            }
            if view.has_active_work() {
                tracing::info!(
                    manual = ?view.manual_running,
                    unresponsive = ?view.manual_unresponsive,
                    scheduled = ?view.scheduled_running,
                    pool_available = view.pool_available,
                    "Active work"
                );
            } else {
                tracing::debug!(jobs = view.job_count, "No active work");
            }
        }
    })
}
