//! Entry points for operators, the HTTP layer and the scheduler.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use virtsync_core::report::SyncStep;
use virtsync_core::status::OperationType;
use virtsync_core::types::DbId;
use virtsync_db::models::operation::CreateOperationLog;
use virtsync_db::models::platform::Platform;

use crate::audit::AuditScope;
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::dispatcher::{job, Dispatcher, JobStatus, StatusStore};
use crate::error::SyncError;
use crate::orchestrator::Orchestrator;
use crate::scheduler::{await_sweep, SweepSummary};
use crate::steps::load_platform;
use crate::throttle::ThrottleGuard;

/// What an operator asks to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    All,
    Platform,
    Hosts,
    Vms,
    Datastores,
    Templates,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Platform => "platform",
            Self::Hosts => "hosts",
            Self::Vms => "vms",
            Self::Datastores => "datastores",
            Self::Templates => "templates",
        }
    }

    /// The single step this type runs; `None` for a full sync.
    pub fn step(self) -> Option<SyncStep> {
        match self {
            Self::All => None,
            Self::Platform => Some(SyncStep::PlatformInfo),
            Self::Hosts => Some(SyncStep::Hosts),
            Self::Vms => Some(SyncStep::Vms),
            Self::Datastores => Some(SyncStep::Datastores),
            Self::Templates => Some(SyncStep::Templates),
        }
    }
}

impl FromStr for SyncType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "platform" => Ok(Self::Platform),
            "hosts" => Ok(Self::Hosts),
            "vms" => Ok(Self::Vms),
            "datastores" => Ok(Self::Datastores),
            "templates" => Ok(Self::Templates),
            other => Err(SyncError::InvalidSyncType(other.to_string())),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a trigger: where to look for the outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Triggered {
    pub task_id: String,
    pub platform_id: DbId,
    pub platform_name: String,
    pub sync_type: SyncType,
    pub message: String,
}

/// One job of a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedSync {
    pub platform_id: DbId,
    pub platform_name: String,
    pub task_id: String,
}

#[derive(Clone)]
pub struct SyncService {
    orchestrator: Arc<Orchestrator>,
    throttle: ThrottleGuard,
    dispatcher: Arc<dyn Dispatcher>,
    statuses: Arc<dyn StatusStore>,
}

impl SyncService {
    pub fn new<D>(ctx: SyncContext, throttle: ThrottleGuard, dispatcher: Arc<D>) -> Self
    where
        D: Dispatcher + StatusStore + 'static,
    {
        Self {
            orchestrator: Arc::new(Orchestrator::new(ctx)),
            throttle,
            statuses: dispatcher.clone(),
            dispatcher,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn throttle(&self) -> &ThrottleGuard {
        &self.throttle
    }

    pub fn config(&self) -> &SyncConfig {
        &self.orchestrator.context().config
    }

    fn ctx(&self) -> &SyncContext {
        self.orchestrator.context()
    }

    /// Operator-triggered sync of one platform.
    ///
    /// Rejects unknown or inactive platforms and platforms synced within the
    /// throttle window. Accepted triggers are written to the operation log.
    pub async fn trigger(
        &self,
        platform_id: DbId,
        sync_type: SyncType,
        operator: &str,
    ) -> Result<Triggered, SyncError> {
        let platform = load_platform(self.ctx(), platform_id).await?;

        if !self.throttle.is_allowed(platform_id).await {
            let remaining_secs = self.throttle.remaining_seconds(platform_id).await;
            tracing::info!(platform_id, remaining_secs, "Sync trigger throttled");
            return Err(SyncError::Throttled { remaining_secs });
        }

        let scope = AuditScope::open(
            Arc::clone(&self.ctx().store),
            &CreateOperationLog {
                operation_type: OperationType::SyncData,
                operator: operator.to_string(),
                target_type: "platform".into(),
                target_id: Some(platform_id),
                target_name: platform.name.clone(),
                parameters: Some(json!({ "sync_type": sync_type.as_str() })),
            },
        )
        .await?;

        self.throttle.mark_executed(platform_id).await;
        let task_id = self.submit_sync(platform_id, sync_type, true);

        let message = format!("{sync_type} sync started");
        scope
            .succeed(Some(json!({ "task_id": task_id, "message": message })))
            .await;

        tracing::info!(
            platform_id,
            platform = %platform.name,
            %sync_type,
            task_id = %task_id,
            operator,
            "Sync triggered",
        );

        Ok(Triggered {
            task_id,
            platform_id,
            platform_name: platform.name,
            sync_type,
            message,
        })
    }

    /// Operator-triggered sweep over every active platform. Not throttled.
    pub async fn trigger_all(&self, operator: &str) -> Result<String, SyncError> {
        let scope = AuditScope::open(
            Arc::clone(&self.ctx().store),
            &CreateOperationLog {
                operation_type: OperationType::SyncData,
                operator: operator.to_string(),
                target_type: "platform".into(),
                target_id: None,
                target_name: "all".into(),
                parameters: Some(json!({ "sync_type": "all" })),
            },
        )
        .await?;

        let task_id = self.submit_full_sweep();
        scope.succeed(Some(json!({ "task_id": task_id }))).await;
        tracing::info!(task_id = %task_id, operator, "All-platform sync triggered");
        Ok(task_id)
    }

    /// Kick off a full sync of a newly registered platform. Inactive
    /// platforms and platforms without a credential are skipped.
    pub async fn platform_created(&self, platform_id: DbId) -> Result<Option<String>, SyncError> {
        let Some(platform) = self.ctx().store.find_platform(platform_id).await? else {
            return Err(SyncError::NotFound { platform_id });
        };
        if !platform.is_active {
            tracing::info!(platform_id, "New platform is inactive, skipping initial sync");
            return Ok(None);
        }
        if self.ctx().store.find_credential(platform_id).await?.is_none() {
            tracing::warn!(platform_id, "New platform has no credential, skipping initial sync");
            return Ok(None);
        }

        let task_id = self.submit_sync(platform_id, SyncType::All, false);
        tracing::info!(platform_id, task_id = %task_id, "Initial sync of new platform dispatched");
        Ok(Some(task_id))
    }

    pub async fn job_status(&self, correlation_id: &str) -> Option<JobStatus> {
        self.statuses.status(correlation_id).await
    }

    /// Ask a running sync to stop at its next step boundary.
    pub async fn cancel(&self, correlation_id: &str) -> bool {
        self.ctx().tracker().cancel(correlation_id).await
    }

    /// Lift the trigger throttle on every platform. Returns how many
    /// platforms were throttled.
    pub async fn clear_throttles(&self) -> u64 {
        self.throttle.clear_all().await
    }

    /// Queue one platform sync. With `throttled`, a failed run lifts the
    /// platform's throttle so the operator can retry straight away.
    fn submit_sync(&self, platform_id: DbId, sync_type: SyncType, throttled: bool) -> String {
        let orchestrator = Arc::clone(&self.orchestrator);
        let throttle = self.throttle.clone();
        let label = match sync_type.step() {
            None => "sync_all_platform_data",
            Some(_) => "sync_platform_entity",
        };

        self.dispatcher.submit(
            label,
            job(move |correlation_id| async move {
                let outcome = match sync_type.step() {
                    None => orchestrator
                        .sync_all(platform_id, &correlation_id)
                        .await
                        .map(|report| json!(report)),
                    Some(step) => orchestrator
                        .sync_entity(platform_id, step, &correlation_id)
                        .await
                        .map(|report| json!(report)),
                };
                if throttled && outcome.is_err() {
                    throttle.clear_limit(platform_id).await;
                }
                outcome
            }),
        )
    }

    /// Queue a full sync of every active platform and a coordinator job
    /// that waits for them. Returns the coordinator's id.
    pub fn submit_full_sweep(&self) -> String {
        let service = self.clone();
        self.dispatcher.submit_unbounded(
            "sync_all_platforms",
            job(move |_| async move {
                let platforms = service.ctx().store.list_active_platforms().await?;
                if platforms.is_empty() {
                    tracing::warn!("No active platforms to sync");
                }
                let dispatched = service.dispatch_each(&platforms, |id| {
                    service.submit_sync(id, SyncType::All, false)
                });
                let summary = service
                    .await_dispatched(&dispatched, service.config().sweep_timeout)
                    .await;
                tracing::info!(
                    total = summary.total,
                    success = summary.success_count,
                    failed = summary.failed_count,
                    timed_out = summary.timed_out,
                    "Full sync sweep finished",
                );
                Ok(json!({
                    "success": summary.success(),
                    "summary": summary,
                    "platforms": dispatched,
                }))
            }),
        )
    }

    /// Queue metric collection for every active platform.
    pub fn submit_metrics_sweep(&self) -> String {
        let service = self.clone();
        self.dispatcher.submit_unbounded(
            "collect_metrics",
            job(move |_| async move {
                let platforms = service.ctx().store.list_active_platforms().await?;
                let dispatched = service.dispatch_each(&platforms, |id| {
                    let orchestrator = Arc::clone(&service.orchestrator);
                    service.dispatcher.submit(
                        "collect_platform_metrics",
                        job(move |correlation_id| async move {
                            orchestrator
                                .collect_metrics(id, &correlation_id)
                                .await
                                .map(|report| json!(report))
                        }),
                    )
                });
                let summary = service
                    .await_dispatched(&dispatched, service.config().metrics_interval)
                    .await;
                tracing::debug!(
                    total = summary.total,
                    failed = summary.failed_count,
                    "Metrics sweep finished",
                );
                Ok(json!({ "success": summary.success(), "summary": summary }))
            }),
        )
    }

    fn dispatch_each(
        &self,
        platforms: &[Platform],
        submit: impl Fn(DbId) -> String,
    ) -> Vec<DispatchedSync> {
        platforms
            .iter()
            .map(|p| DispatchedSync {
                platform_id: p.id,
                platform_name: p.name.clone(),
                task_id: submit(p.id),
            })
            .collect()
    }

    async fn await_dispatched(
        &self,
        dispatched: &[DispatchedSync],
        timeout: std::time::Duration,
    ) -> SweepSummary {
        let ids: Vec<String> = dispatched.iter().map(|d| d.task_id.clone()).collect();
        await_sweep(self.statuses.as_ref(), &ids, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn sync_type_parses_every_documented_value() {
        for (raw, step) in [
            ("all", None),
            ("platform", Some(SyncStep::PlatformInfo)),
            ("hosts", Some(SyncStep::Hosts)),
            ("vms", Some(SyncStep::Vms)),
            ("datastores", Some(SyncStep::Datastores)),
            ("templates", Some(SyncStep::Templates)),
        ] {
            let parsed: SyncType = raw.parse().unwrap();
            assert_eq!(parsed.step(), step);
            assert_eq!(parsed.as_str(), raw);
        }
    }

    #[test]
    fn unknown_sync_type_is_rejected() {
        assert_matches!(
            "networks".parse::<SyncType>(),
            Err(SyncError::InvalidSyncType(t)) if t == "networks"
        );
    }
}
