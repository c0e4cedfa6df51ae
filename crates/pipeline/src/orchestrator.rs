//! Drives one platform's sync under an OperationTask.

use std::future::Future;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;
use virtsync_core::report::{StepReport, SyncReport, SyncStep};
use virtsync_core::status::TaskType;
use virtsync_core::types::DbId;
use virtsync_db::models::operation::CreateOperationTask;
use virtsync_db::models::platform::Platform;
use virtsync_events::SyncEvent;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::steps::{load_platform, run_step};
use crate::tracker::TaskTracker;

pub struct Orchestrator {
    ctx: SyncContext,
}

impl Orchestrator {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Full sync of one platform: platform info, hosts, VMs, datastores and
    /// templates in that order.
    ///
    /// A step that fails is recorded in the report and the sequence moves
    /// on; the sync still counts as successful. Only errors that escape the
    /// sequence (platform gone, store unavailable, timeout, cancellation)
    /// fail the task and are returned.
    pub async fn sync_all(
        &self,
        platform_id: DbId,
        correlation_id: &str,
    ) -> Result<SyncReport, SyncError> {
        let platform = load_platform(&self.ctx, platform_id)
            .await
            .inspect_err(|e| tracing::warn!(platform_id, error = %e, "Full sync rejected"))?;

        let tracker = self.ctx.tracker();
        let input = CreateOperationTask {
            correlation_id: correlation_id.to_string(),
            task_type: TaskType::SyncPlatform,
            name: format!("Sync platform {}", platform.name),
            platform_id: Some(platform_id),
            parameters: Some(json!({ "sync_type": "all" })),
            scheduled_at: None,
        };
        if let Err(e) = tracker.create(&input).await {
            let err = SyncError::from(e);
            self.emit_failed(&platform, &err);
            return Err(err);
        }
        tracker.start(correlation_id, SyncStep::PlatformInfo.as_str()).await;

        tracing::info!(
            platform_id,
            platform = %platform.name,
            correlation_id,
            "Full platform sync started",
        );

        let outcome = self
            .within_budget(self.run_sequence(&tracker, &platform, correlation_id))
            .await;

        let outcome = match outcome {
            Ok(report) => match self.finish(&tracker, correlation_id, &report).await {
                Ok(()) => Ok(report),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                if let Err(e) = self
                    .ctx
                    .store
                    .touch_last_sync(platform_id, report.sync_time)
                    .await
                {
                    tracing::warn!(platform_id, error = %e, "Failed to record last sync time");
                }
                tracing::info!(
                    platform_id,
                    correlation_id,
                    synced = report.total_synced(),
                    failed = report.total_failed(),
                    "Full platform sync completed",
                );
                self.ctx.events.emit(SyncEvent::SyncCompleted {
                    platform_id,
                    platform_name: platform.name.clone(),
                    summary: report.clone(),
                });
                Ok(report)
            }
            Err(SyncError::Cancelled) => {
                tracing::info!(platform_id, correlation_id, "Full platform sync cancelled");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                tracing::error!(
                    platform_id,
                    correlation_id,
                    error = %e,
                    "Full platform sync failed",
                );
                tracker.fail(correlation_id, &e.to_string()).await;
                self.emit_failed(&platform, &e);
                Err(e)
            }
        }
    }

    async fn run_sequence(
        &self,
        tracker: &TaskTracker,
        platform: &Platform,
        correlation_id: &str,
    ) -> Result<SyncReport, SyncError> {
        let total = SyncStep::FULL_SYNC.len();
        let mut results = Vec::with_capacity(total);
        let retry_deadline = self.retry_deadline();

        for (index, step) in SyncStep::FULL_SYNC.into_iter().enumerate() {
            if tracker.is_cancelled(correlation_id).await {
                return Err(SyncError::Cancelled);
            }
            tracker
                .progress(correlation_id, percent(index, total), step.as_str())
                .await;
            let deadline = step_deadline(Instant::now(), retry_deadline, total - index);
            results.push(run_step(&self.ctx, platform.id, step, Some(deadline)).await?);
        }
        tracker.progress(correlation_id, 100, "completed").await;

        Ok(SyncReport {
            success: true,
            platform_id: platform.id,
            platform_name: platform.name.clone(),
            results,
            sync_time: Utc::now(),
        })
    }

    /// Run a single step under its own OperationTask. A step that fails
    /// after its retries fails the task.
    pub async fn sync_entity(
        &self,
        platform_id: DbId,
        step: SyncStep,
        correlation_id: &str,
    ) -> Result<StepReport, SyncError> {
        let platform = load_platform(&self.ctx, platform_id).await?;

        let tracker = self.ctx.tracker();
        tracker
            .create(&CreateOperationTask {
                correlation_id: correlation_id.to_string(),
                task_type: step.task_type(),
                name: format!("Sync {step} of {}", platform.name),
                platform_id: Some(platform_id),
                parameters: Some(json!({ "sync_type": step.as_str() })),
                scheduled_at: None,
            })
            .await?;
        tracker.start(correlation_id, step.as_str()).await;

        let outcome = self
            .within_budget(run_step(&self.ctx, platform_id, step, Some(self.retry_deadline())))
            .await
            .and_then(|report| {
                if report.success {
                    Ok(report)
                } else {
                    Err(SyncError::StepFailed {
                        step,
                        error: report.error.unwrap_or_default(),
                    })
                }
            });

        let outcome = match outcome {
            Ok(report) => match self.finish(&tracker, correlation_id, &report).await {
                Ok(()) => Ok(report),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => Ok(report),
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                tracker.fail(correlation_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Sample host and VM usage into the metric tables.
    pub async fn collect_metrics(
        &self,
        platform_id: DbId,
        correlation_id: &str,
    ) -> Result<StepReport, SyncError> {
        self.sync_entity(platform_id, SyncStep::Metrics, correlation_id).await
    }

    /// Mark the task successful. A cancel that landed while the last step
    /// ran wins over the result.
    async fn finish<R: serde::Serialize>(
        &self,
        tracker: &TaskTracker,
        correlation_id: &str,
        report: &R,
    ) -> Result<(), SyncError> {
        let result = serde_json::to_value(report).unwrap_or_default();
        if tracker.succeed(correlation_id, result).await.is_none()
            && tracker.is_cancelled(correlation_id).await
        {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Retries stop early enough to leave the last attempt a tenth of the
    /// platform budget.
    fn retry_deadline(&self) -> Instant {
        Instant::now() + self.ctx.config.platform_timeout.mul_f64(0.9)
    }

    async fn within_budget<T>(
        &self,
        fut: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        let budget = self.ctx.config.platform_timeout;
        tokio::time::timeout(budget, fut)
            .await
            .unwrap_or(Err(SyncError::Timeout(budget.as_secs())))
    }

    fn emit_failed(&self, platform: &Platform, error: &SyncError) {
        self.ctx.events.emit(SyncEvent::SyncFailed {
            platform_id: platform.id,
            platform_name: platform.name.clone(),
            error: error.to_string(),
        });
    }
}

/// Split what is left of the retry window evenly over the remaining steps,
/// so a failing early step cannot starve the later ones.
fn step_deadline(now: Instant, retry_deadline: Instant, remaining: usize) -> Instant {
    let left = retry_deadline.saturating_duration_since(now);
    let share = u32::try_from(remaining.max(1)).unwrap_or(u32::MAX);
    now + left / share
}

/// Share of `total` steps completed before step `index`.
fn percent(index: usize, total: usize) -> i16 {
    if total == 0 {
        return 100;
    }
    i16::try_from(index * 100 / total).unwrap_or(100)
}
