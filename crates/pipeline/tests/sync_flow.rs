//! Full and single-step syncs against the in-memory store and a fixture
//! inventory.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use virtsync_core::native::{HostHardware, NativeHost};
use virtsync_core::report::SyncStep;
use virtsync_core::status::{OperationStatus, PlatformStatus};
use virtsync_events::SyncEvent;
use virtsync_inventory::{Call, InventoryError};
use virtsync_pipeline::{SyncConfig, SyncError};

// ---------------------------------------------------------------------------
// Test: a full sync persists every entity kind and reports per step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_sync_persists_inventory() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;

    let report = h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    assert!(report.success);
    let steps: Vec<SyncStep> = report.results.iter().map(|r| r.step).collect();
    assert_eq!(steps, SyncStep::FULL_SYNC.to_vec());
    assert!(report.results.iter().all(|r| r.success));

    assert_eq!(h.store.hosts(platform.id).await.len(), 2);
    assert_eq!(h.store.vms(platform.id).await.len(), 2);
    assert_eq!(h.store.templates(platform.id).await.len(), 1);
    let datastores = h.store.datastores(platform.id).await;
    assert_eq!(datastores.len(), 1);
    assert_eq!(h.store.datastore_host_ids(datastores[0].id).await.len(), 2);

    let stored = h.store.platform(platform.id).await.unwrap();
    assert_eq!(stored.version, "8.0.2");
    assert_eq!(stored.total_hosts, 2);
    assert_eq!(stored.total_vms, 2);
    assert!(stored.last_sync_at.is_some());

    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Success);
    assert_eq!(task.progress, 100);
    assert_eq!(h.connector.open_sessions(), 0);
}

// ---------------------------------------------------------------------------
// Test: a VM's host reference resolves to the host row
// ---------------------------------------------------------------------------

#[tokio::test]
async fn vm_is_linked_to_its_host() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    let hosts = h.store.hosts(platform.id).await;
    let esx01 = hosts.iter().find(|h| h.name == "esx01.lab").unwrap();
    let vms = h.store.vms(platform.id).await;
    let web01 = vms.iter().find(|v| v.name == "web01").unwrap();
    assert_eq!(web01.host_id, Some(esx01.id));
    assert_eq!(h.store.disks(web01.id).await.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: running the same sync twice changes nothing the second time
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_sync_is_idempotent() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    let orchestrator = h.orchestrator();

    let first = orchestrator.sync_all(platform.id, "task-1").await.unwrap();
    let second = orchestrator.sync_all(platform.id, "task-2").await.unwrap();

    let hosts = |r: &virtsync_core::report::SyncReport| {
        r.results.iter().find(|s| s.step == SyncStep::Hosts).cloned().unwrap()
    };
    assert_eq!(hosts(&first).created_count, 2);
    assert_eq!(hosts(&second).created_count, 0);
    assert_eq!(hosts(&second).updated_count, 2);
    assert_eq!(h.store.hosts(platform.id).await.len(), 2);
    assert_eq!(h.store.vms(platform.id).await.len(), 2);
}

// ---------------------------------------------------------------------------
// Test: entities missing from the inventory are deactivated, not deleted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn absent_entities_are_deactivated() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    let orchestrator = h.orchestrator();
    orchestrator.sync_all(platform.id, "task-1").await.unwrap();

    h.connector
        .update(|inv| {
            inv.hosts.retain(|host| host.name != "esx02.lab");
            inv.vms.retain(|vm| vm.name != "db01");
        })
        .await;
    orchestrator.sync_all(platform.id, "task-2").await.unwrap();

    let hosts = h.store.hosts(platform.id).await;
    assert_eq!(hosts.len(), 2);
    let esx02 = hosts.iter().find(|h| h.name == "esx02.lab").unwrap();
    assert!(!esx02.is_active);
    let vms = h.store.vms(platform.id).await;
    assert!(!vms.iter().find(|v| v.name == "db01").unwrap().is_active);
    assert!(vms.iter().find(|v| v.name == "web01").unwrap().is_active);
}

// ---------------------------------------------------------------------------
// Test: a failed deactivation does not fail the step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deactivation_failure_is_skipped() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.store.set_fail_deactivation(true);

    let report = run_step_report(&h, platform.id, SyncStep::Hosts).await;

    assert!(report.success);
    assert_eq!(report.synced_count, 2);
    let detail = report.detail.unwrap();
    assert_eq!(detail["deactivation_skipped"], true);
}

// ---------------------------------------------------------------------------
// Test: a record without an identity key is counted as failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn host_without_uuid_is_counted_as_failed() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector
        .update(|inv| {
            inv.hosts.push(NativeHost {
                name: "esx03.lab".into(),
                hardware: Some(HostHardware::default()),
                ..Default::default()
            })
        })
        .await;

    let report = run_step_report(&h, platform.id, SyncStep::Hosts).await;

    assert!(report.success);
    assert_eq!(report.synced_count, 2);
    assert_eq!(report.failed_count, 1);
    assert_eq!(h.store.hosts(platform.id).await.len(), 2);
}

// ---------------------------------------------------------------------------
// Test: a rejected row fails alone; the rest of the batch persists
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_row_does_not_abort_the_batch() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.store.reject_key("vm-uuid-1").await;

    let report = run_step_report(&h, platform.id, SyncStep::Vms).await;

    assert!(report.success);
    assert_eq!(report.synced_count, 1);
    assert_eq!(report.failed_count, 1);
    let vms = h.store.vms(platform.id).await;
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].name, "db01");
}

// ---------------------------------------------------------------------------
// Test: snapshot children are linked to parents regardless of order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_tree_is_linked() {
    let tree = vec![snapshot(
        1,
        "base",
        vec![snapshot(2, "patched", vec![snapshot(3, "upgraded", vec![])])],
    )];
    let mut inventory = sample_inventory();
    inventory.vms[0] = with_snapshots(inventory.vms[0].clone(), 3, tree);
    let h = Harness::new(inventory);
    let platform = h.platform("vc01").await;

    run_step_report(&h, platform.id, SyncStep::Vms).await;

    let web01 = h
        .store
        .vms(platform.id)
        .await
        .into_iter()
        .find(|v| v.name == "web01")
        .unwrap();
    assert!(web01.has_snapshots);
    assert_eq!(web01.snapshot_count, 3);

    let snapshots = h.store.snapshots(web01.id).await;
    let by_id = |id: i64| snapshots.iter().find(|s| s.snapshot_id == id).unwrap();
    assert_eq!(by_id(1).parent_id, None);
    assert_eq!(by_id(2).parent_id, Some(by_id(1).id));
    assert_eq!(by_id(3).parent_id, Some(by_id(2).id));
    assert!(by_id(3).is_current);
    assert!(!by_id(1).is_current);
}

// ---------------------------------------------------------------------------
// Test: a step that keeps failing is retried, then recorded as failed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_step_is_retried_then_reported() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector
        .fail_always(Call::Datastores, InventoryError::Network("connection reset".into()))
        .await;

    let report = h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    assert!(report.success);
    let ds = report
        .results
        .iter()
        .find(|r| r.step == SyncStep::Datastores)
        .unwrap();
    assert!(!ds.success);
    assert_eq!(ds.attempts, 3);
    assert!(ds.error.as_deref().unwrap().contains("connection reset"));
    let failed: Vec<SyncStep> = report.failed_steps().map(|r| r.step).collect();
    assert_eq!(failed, vec![SyncStep::Datastores]);
    assert_eq!(h.connector.calls(Call::Datastores).await, 3);

    // Later steps still ran.
    assert_eq!(h.store.templates(platform.id).await.len(), 1);
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Success);
}

#[tokio::test]
async fn transient_failure_recovers_within_retries() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector.fail_times(Call::Templates, 2, InventoryError::Timeout).await;

    let report = run_step_report(&h, platform.id, SyncStep::Templates).await;

    assert!(report.success);
    assert_eq!(report.attempts, 3);
    assert_eq!(h.store.templates(platform.id).await.len(), 1);
}

#[tokio::test]
async fn decode_errors_are_not_retried() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector
        .fail_always(Call::Templates, InventoryError::Decode("unexpected payload".into()))
        .await;

    let report = run_step_report(&h, platform.id, SyncStep::Templates).await;

    assert!(!report.success);
    assert_eq!(report.attempts, 1);
}

// ---------------------------------------------------------------------------
// Test: platform status follows the platform-info step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_successful_sync_marks_platform_connected() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    assert_eq!(platform.status(), Some(PlatformStatus::Disconnected));

    h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    let stored = h.store.platform(platform.id).await.unwrap();
    assert_eq!(stored.status(), Some(PlatformStatus::Connected));
    let events = h.events.events();
    assert_matches!(
        &events[0],
        SyncEvent::StatusChanged {
            old_status: PlatformStatus::Disconnected,
            new_status: PlatformStatus::Connected,
            ..
        }
    );
    assert_matches!(events.last(), Some(SyncEvent::SyncCompleted { .. }));
}

#[tokio::test]
async fn unreachable_platform_is_marked_error() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector
        .fail_always(Call::Connect, InventoryError::Auth("bad password".into()))
        .await;

    let report = h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    assert!(report.results.iter().all(|r| !r.success));
    let stored = h.store.platform(platform.id).await.unwrap();
    assert_eq!(stored.status(), Some(PlatformStatus::Error));
}

// ---------------------------------------------------------------------------
// Test: rejected and aborted syncs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inactive_platform_is_rejected() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.store.set_platform_active(platform.id, false).await;

    let result = h.orchestrator().sync_all(platform.id, "task-1").await;

    assert_matches!(result, Err(SyncError::NotFound { platform_id }) if platform_id == platform.id);
    assert!(h.store.tasks().await.is_empty());
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn missing_credential_fails_every_step() {
    let h = Harness::new(sample_inventory());
    let platform = h
        .store
        .insert_platform(virtsync_db::models::platform::CreatePlatform {
            name: "bare".into(),
            platform_type: virtsync_core::status::PlatformType::Esxi,
            address: "esx99.lab".into(),
            port: None,
            verify_tls: None,
            region: None,
        })
        .await;

    let report = h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    assert!(report.results.iter().all(|r| !r.success && r.attempts == 0));
    assert_eq!(h.connector.connects(), 0);
}

#[tokio::test]
async fn unavailable_store_fails_the_sync() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    let orchestrator = h.orchestrator();
    h.store.set_unavailable(true);

    let result = orchestrator.sync_all(platform.id, "task-1").await;

    assert_matches!(result, Err(SyncError::Persistence(_)));
}

#[tokio::test(start_paused = true)]
async fn sync_over_budget_times_out() {
    let config = SyncConfig {
        platform_timeout: Duration::from_secs(5),
        ..test_config()
    };
    let h = Harness::with_config(sample_inventory(), config);
    let platform = h.platform("vc01").await;
    h.connector.delay(Call::Hosts, Duration::from_secs(60)).await;

    let result = h.orchestrator().sync_all(platform.id, "task-1").await;

    assert_matches!(result, Err(SyncError::Timeout(5)));
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Failed);
    assert_matches!(h.events.events().last(), Some(SyncEvent::SyncFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn unreachable_platform_reports_every_step_within_budget() {
    let config = SyncConfig::default();
    let budget = config.platform_timeout;
    let h = Harness::with_config(sample_inventory(), config);
    let platform = h.platform("vc01").await;
    h.connector
        .fail_always(Call::Connect, InventoryError::Network("no route to host".into()))
        .await;
    let started = tokio::time::Instant::now();

    let report = h.orchestrator().sync_all(platform.id, "task-1").await.unwrap();

    assert!(started.elapsed() < budget);
    assert_eq!(report.results.len(), SyncStep::FULL_SYNC.len());
    for step in &report.results {
        assert!(!step.success, "{} should have failed", step.step);
        assert!(step.attempts >= 1);
        assert!(step.error.as_deref().unwrap().contains("no route to host"));
    }
    // The first step still gets more than one attempt.
    assert!(report.results[0].attempts > 1);
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Success);
    let stored = h.store.platform(platform.id).await.unwrap();
    assert_eq!(stored.status(), Some(PlatformStatus::Error));
}

#[tokio::test(start_paused = true)]
async fn cancelled_sync_stops_at_the_next_step() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector.delay(Call::About, Duration::from_secs(10)).await;
    let orchestrator = Arc::new(h.orchestrator());

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.sync_all(platform.id, "task-1").await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(orchestrator.context().tracker().cancel("task-1").await);

    let result = running.await.unwrap();
    assert_matches!(result, Err(SyncError::Cancelled));
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Cancelled);
    assert_eq!(h.connector.calls(Call::Hosts).await, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_the_last_step_is_not_reported_as_success() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector.delay(Call::Templates, Duration::from_secs(10)).await;
    let orchestrator = Arc::new(h.orchestrator());

    let running = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.sync_all(platform.id, "task-1").await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(orchestrator.context().tracker().cancel("task-1").await);

    let result = running.await.unwrap();
    assert_matches!(result, Err(SyncError::Cancelled));
    assert_eq!(h.connector.calls(Call::Templates).await, 1);
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Cancelled);
    assert!(task.result.is_none());
    assert!(!h
        .events
        .events()
        .iter()
        .any(|e| matches!(e, SyncEvent::SyncCompleted { .. })));
}

// ---------------------------------------------------------------------------
// Test: single-step syncs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn entity_sync_failure_fails_the_task() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    h.connector
        .fail_always(Call::Datastores, InventoryError::Timeout)
        .await;

    let result = h
        .orchestrator()
        .sync_entity(platform.id, SyncStep::Datastores, "task-1")
        .await;

    assert_matches!(result, Err(SyncError::StepFailed { step: SyncStep::Datastores, .. }));
    let task = h.store.tasks().await.remove(0);
    assert_eq!(task.status(), OperationStatus::Failed);
    assert_eq!(task.task_type, "sync_datastores");
}

#[tokio::test]
async fn metrics_are_sampled_for_known_entities() {
    let h = Harness::new(sample_inventory());
    let platform = h.platform("vc01").await;
    let orchestrator = h.orchestrator();
    orchestrator.sync_all(platform.id, "task-1").await.unwrap();

    let report = orchestrator.collect_metrics(platform.id, "task-2").await.unwrap();

    assert!(report.success);
    let host_metrics = h.store.host_metrics().await;
    assert_eq!(host_metrics.len(), 2);
    // 9600 MHz used of 16 cores x 2400 MHz.
    assert!((host_metrics[0].cpu_usage_percent - 25.0).abs() < 0.01);
    assert_eq!(h.store.vm_metrics().await.len(), 2);
}

async fn run_step_report(
    h: &Harness,
    platform_id: i64,
    step: SyncStep,
) -> virtsync_core::report::StepReport {
    virtsync_pipeline::steps::run_step(&h.context(), platform_id, step, None)
        .await
        .unwrap()
}
