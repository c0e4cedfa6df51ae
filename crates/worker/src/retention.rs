//! Periodic cleanup of old host and VM metric samples.
//!
//! Deletes samples older than the retention period on a fixed interval
//! using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use virtsync_db::SyncStore;

/// Default retention period: 24 hours.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Retention period from `METRICS_RETENTION_HOURS`, falling back to 24.
pub fn retention_hours_from_env() -> i64 {
    std::env::var("METRICS_RETENTION_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|h: &i64| *h > 0)
        .unwrap_or(DEFAULT_RETENTION_HOURS)
}

/// Run the cleanup loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn SyncStore>, retention_hours: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_hours,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Metrics retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Metrics retention job stopping");
                break;
            }
            _ = interval.tick() => {
                prune_once(store.as_ref(), retention_hours).await;
            }
        }
    }
}

/// Delete samples older than `retention_hours`. Returns the rows removed.
pub async fn prune_once(store: &dyn SyncStore, retention_hours: i64) -> u64 {
    let cutoff = Utc::now() - chrono::Duration::hours(retention_hours);
    match store.prune_metrics(cutoff).await {
        Ok(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, "Metrics retention: purged old rows");
            } else {
                tracing::debug!("Metrics retention: no rows to purge");
            }
            deleted
        }
        Err(e) => {
            tracing::error!(error = %e, "Metrics retention: cleanup failed");
            0
        }
    }
}
