//! The individual sub-syncs of a platform.
//!
//! Each attempt opens its own inventory session, enumerates once,
//! normalizes and reconciles, and closes the session on every exit path.
//! Connection-level failures are retried per [`RetryPolicy`], never past the
//! caller's deadline; whatever is left after the last attempt becomes a
//! failed [`StepReport`] so the surrounding sequence keeps going.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use serde_json::json;
use virtsync_core::native::NativeVm;
use virtsync_core::normalize::{self, ParseError};
use virtsync_core::report::{StepReport, SyncStep};
use virtsync_core::status::PlatformStatus;
use virtsync_core::types::DbId;
use virtsync_db::models::platform::Platform;
use virtsync_events::SyncEvent;
use virtsync_inventory::{with_session, ConnectParams, InventorySession};

use crate::context::SyncContext;
use crate::credentials::connect_params;
use crate::error::SyncError;
use crate::reconcile::{reconcile, ReconcileOutcome};

/// A platform resolved for syncing, with its connection parameters.
pub(crate) struct Target {
    pub platform: Platform,
    pub params: ConnectParams,
}

/// Load an active platform. Missing and inactive are the same to callers.
pub(crate) async fn load_platform(
    ctx: &SyncContext,
    platform_id: DbId,
) -> Result<Platform, SyncError> {
    ctx.store
        .find_platform(platform_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or(SyncError::NotFound { platform_id })
}

async fn load_target(ctx: &SyncContext, platform_id: DbId) -> Result<Target, SyncError> {
    let platform = load_platform(ctx, platform_id).await?;
    let credential = ctx
        .store
        .find_credential(platform_id)
        .await?
        .ok_or(SyncError::MissingCredential { platform_id })?;
    let params = connect_params(
        &platform,
        &credential,
        ctx.secrets.as_ref(),
        ctx.config.request_timeout,
    )?;
    Ok(Target { platform, params })
}

/// Run one step against a platform.
///
/// Returns `Err` only for errors that must abort the surrounding sequence
/// (see [`SyncError::is_fatal`]); every other failure is folded into a
/// failed report.
pub async fn run_step(
    ctx: &SyncContext,
    platform_id: DbId,
    step: SyncStep,
    deadline: Option<Instant>,
) -> Result<StepReport, SyncError> {
    let target = match load_target(ctx, platform_id).await {
        Ok(target) => target,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            tracing::error!(platform_id, %step, error = %e, "Cannot start sync step");
            if step == SyncStep::PlatformInfo {
                if let Ok(platform) = load_platform(ctx, platform_id).await {
                    record_status(ctx, &platform, PlatformStatus::Error).await;
                }
            }
            return Ok(StepReport::failed(step, 0, e.to_string()));
        }
    };

    tracing::info!(
        platform_id,
        platform = %target.platform.name,
        %step,
        "Sync step started",
    );

    let (result, attempts) = ctx
        .retry_policy()
        .until(deadline)
        .run(step.as_str(), |_| attempt(ctx, &target, step))
        .await;

    match result {
        Ok(mut report) => {
            report.attempts = attempts;
            if step == SyncStep::PlatformInfo {
                record_status(ctx, &target.platform, PlatformStatus::Connected).await;
            }
            tracing::info!(
                platform_id,
                %step,
                synced = report.synced_count,
                failed = report.failed_count,
                attempts,
                "Sync step finished",
            );
            Ok(report)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::error!(platform_id, %step, attempts, error = %e, "Sync step failed");
            if step == SyncStep::PlatformInfo {
                record_status(ctx, &target.platform, PlatformStatus::Error).await;
            }
            Ok(StepReport::failed(step, attempts, e.to_string()))
        }
    }
}

async fn attempt(
    ctx: &SyncContext,
    target: &Target,
    step: SyncStep,
) -> Result<StepReport, SyncError> {
    let platform_id = target.platform.id;
    with_session(ctx.connector.as_ref(), &target.params, |session| async move {
        match step {
            SyncStep::PlatformInfo => sync_platform_info(ctx, platform_id, session).await,
            SyncStep::Hosts => sync_hosts(ctx, platform_id, session).await,
            SyncStep::Vms => sync_vms(ctx, platform_id, session).await,
            SyncStep::Datastores => sync_datastores(ctx, platform_id, session).await,
            SyncStep::Templates => sync_templates(ctx, platform_id, session).await,
            SyncStep::Metrics => collect_metrics(ctx, platform_id, session).await,
        }
    })
    .await
}

/// Set the platform's connection status and announce a change.
async fn record_status(ctx: &SyncContext, platform: &Platform, status: PlatformStatus) {
    match ctx.store.set_platform_status(platform.id, status).await {
        Ok(old) if old != status => {
            tracing::info!(
                platform_id = platform.id,
                old_status = %old,
                new_status = %status,
                "Platform status changed",
            );
            ctx.events.emit(SyncEvent::StatusChanged {
                platform_id: platform.id,
                platform_name: platform.name.clone(),
                old_status: old,
                new_status: status,
            });
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(
                platform_id = platform.id,
                error = %e,
                "Failed to record platform status",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-syncs
// ---------------------------------------------------------------------------

type Session = Arc<dyn InventorySession>;

async fn sync_platform_info(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let about = session.about().await?;
    let datacenters: Vec<String> = session
        .list_datacenters()
        .await?
        .into_iter()
        .map(|dc| dc.name)
        .collect();
    let clusters = session.list_clusters().await?.len();
    let hosts = session.list_hosts().await?.len();
    let vms = session
        .list_vms()
        .await?
        .iter()
        .filter(|vm| !vm.is_template())
        .count();

    let info = normalize::normalize_platform_info(&about, &datacenters, clusters, hosts, vms);
    ctx.store.update_platform_info(platform_id, &info).await?;

    Ok(StepReport {
        step: SyncStep::PlatformInfo,
        success: true,
        synced_count: 1,
        failed_count: 0,
        created_count: 0,
        updated_count: 1,
        attempts: 1,
        error: None,
        detail: Some(json!(info)),
    })
}

async fn sync_hosts(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let natives = session.list_hosts().await?;
    let (records, parse_failed) =
        normalize_batch(platform_id, SyncStep::Hosts, &natives, normalize::normalize_host);
    let outcome = reconcile(ctx.store.as_ref(), platform_id, &records).await?;
    Ok(entity_report(SyncStep::Hosts, outcome, parse_failed))
}

async fn sync_vms(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let natives: Vec<NativeVm> = session
        .list_vms()
        .await?
        .into_iter()
        .filter(|vm| !vm.is_template())
        .collect();
    let (records, parse_failed) =
        normalize_batch(platform_id, SyncStep::Vms, &natives, normalize::normalize_vm);
    let outcome = reconcile(ctx.store.as_ref(), platform_id, &records).await?;
    Ok(entity_report(SyncStep::Vms, outcome, parse_failed))
}

async fn sync_datastores(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let natives = session.list_datastores().await?;
    let (records, parse_failed) = normalize_batch(
        platform_id,
        SyncStep::Datastores,
        &natives,
        normalize::normalize_datastore,
    );
    let outcome = reconcile(ctx.store.as_ref(), platform_id, &records).await?;
    Ok(entity_report(SyncStep::Datastores, outcome, parse_failed))
}

async fn sync_templates(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let natives = session.list_templates().await?;
    let (records, parse_failed) = normalize_batch(
        platform_id,
        SyncStep::Templates,
        &natives,
        normalize::normalize_template,
    );
    let outcome = reconcile(ctx.store.as_ref(), platform_id, &records).await?;
    Ok(entity_report(SyncStep::Templates, outcome, parse_failed))
}

async fn collect_metrics(
    ctx: &SyncContext,
    platform_id: DbId,
    session: Session,
) -> Result<StepReport, SyncError> {
    let hosts = session.list_hosts().await?;
    let vms: Vec<NativeVm> = session
        .list_vms()
        .await?
        .into_iter()
        .filter(|vm| !vm.is_template())
        .collect();

    let (host_samples, host_failed) =
        normalize_batch(platform_id, SyncStep::Metrics, &hosts, normalize::host_metric_sample);
    let (vm_samples, vm_failed) =
        normalize_batch(platform_id, SyncStep::Metrics, &vms, normalize::vm_metric_sample);

    let collected_at = Utc::now();
    let host_rows = ctx
        .store
        .insert_host_metrics(platform_id, &host_samples, collected_at)
        .await?;
    let vm_rows = ctx
        .store
        .insert_vm_metrics(platform_id, &vm_samples, collected_at)
        .await?;

    Ok(StepReport {
        step: SyncStep::Metrics,
        success: true,
        synced_count: host_rows + vm_rows,
        failed_count: host_failed + vm_failed,
        created_count: host_rows + vm_rows,
        updated_count: 0,
        attempts: 1,
        error: None,
        detail: Some(json!({ "host_samples": host_rows, "vm_samples": vm_rows })),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Normalize every native record, logging and counting the ones that fail.
fn normalize_batch<N, R>(
    platform_id: DbId,
    step: SyncStep,
    natives: &[N],
    f: impl Fn(&N) -> Result<R, ParseError>,
) -> (Vec<R>, u64) {
    let mut records = Vec::with_capacity(natives.len());
    let mut failed = 0;
    for native in natives {
        match f(native) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(platform_id, %step, error = %e, "Skipping unparseable record");
                failed += 1;
            }
        }
    }
    (records, failed)
}

fn entity_report(step: SyncStep, outcome: ReconcileOutcome, parse_failed: u64) -> StepReport {
    StepReport {
        step,
        success: true,
        synced_count: outcome.synced(),
        failed_count: outcome.failed + parse_failed,
        created_count: outcome.created,
        updated_count: outcome.updated,
        attempts: 1,
        error: None,
        detail: Some(json!({
            "deactivated": outcome.deactivated,
            "deactivation_skipped": outcome.deactivation_skipped,
        })),
    }
}
