//! Periodic sweeps over every active platform.

use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{JobState, StatusStore};
use crate::service::SyncService;

/// How often [`await_sweep`] polls job status.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Aggregate outcome of a set of dispatched jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    /// Jobs still unfinished when the wait gave up.
    pub pending_count: usize,
    pub timed_out: bool,
}

impl SweepSummary {
    pub fn success(&self) -> bool {
        !self.timed_out && self.failed_count == 0
    }
}

/// Wait for every job in `task_ids` to finish, up to `timeout`.
///
/// Giving up leaves the jobs running; the summary is marked timed out and
/// counts them as pending.
pub async fn await_sweep(
    statuses: &dyn StatusStore,
    task_ids: &[String],
    timeout: Duration,
) -> SweepSummary {
    let deadline = Instant::now() + timeout;
    loop {
        let mut summary = SweepSummary {
            total: task_ids.len(),
            ..Default::default()
        };
        for id in task_ids {
            match statuses.status(id).await.map(|s| s.status) {
                Some(JobState::Success) => summary.success_count += 1,
                Some(JobState::Failure | JobState::Revoked) => summary.failed_count += 1,
                Some(JobState::Pending | JobState::Started) | None => summary.pending_count += 1,
            }
        }

        if summary.pending_count == 0 {
            return summary;
        }
        if Instant::now() >= deadline {
            summary.timed_out = true;
            tracing::warn!(
                total = summary.total,
                pending = summary.pending_count,
                timeout_secs = timeout.as_secs(),
                "Sweep did not finish in time",
            );
            return summary;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(POLL_INTERVAL.min(left)).await;
    }
}

/// Triggers the full-sync and metrics sweeps on fixed intervals.
pub struct Scheduler {
    service: SyncService,
    full_sync_interval: Duration,
    metrics_interval: Duration,
}

impl Scheduler {
    pub fn new(service: SyncService) -> Self {
        let config = service.config();
        Self {
            full_sync_interval: config.full_sync_interval,
            metrics_interval: config.metrics_interval,
            service,
        }
    }

    /// Run until `cancel` fires. The first sweep of each kind happens one
    /// interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = Instant::now();
        let mut full = interval_at(start + self.full_sync_interval, self.full_sync_interval);
        let mut metrics = interval_at(start + self.metrics_interval, self.metrics_interval);
        full.set_missed_tick_behavior(MissedTickBehavior::Delay);
        metrics.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            full_sync_interval_secs = self.full_sync_interval.as_secs(),
            metrics_interval_secs = self.metrics_interval.as_secs(),
            "Sync scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sync scheduler shutting down");
                    break;
                }
                _ = full.tick() => {
                    let task_id = self.service.submit_full_sweep();
                    tracing::info!(task_id = %task_id, "Scheduled full sync sweep dispatched");
                }
                _ = metrics.tick() => {
                    let task_id = self.service.submit_metrics_sweep();
                    tracing::debug!(task_id = %task_id, "Scheduled metrics sweep dispatched");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
