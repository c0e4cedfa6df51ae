//! Upsert-and-deactivate reconciliation of normalized records.
//!
//! For one platform and one entity type: every record is upserted by its
//! identity key, then a single bulk pass deactivates the platform's rows
//! whose key was not reported. Records that fail to persist still count as
//! seen so a transient write failure never deactivates a live object.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use virtsync_core::records::{DatastoreRecord, HostRecord, TemplateRecord, VmRecord};
use virtsync_core::types::DbId;
use virtsync_db::{StoreError, StoreResult, SyncStore, Upserted};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub deactivated: u64,
    /// The bulk deactivation failed and was skipped.
    pub deactivation_skipped: bool,
}

impl ReconcileOutcome {
    pub fn synced(&self) -> u64 {
        self.created + self.updated
    }
}

/// A canonical record the reconciler knows how to persist.
#[async_trait]
pub trait Reconcile: Send + Sync {
    const ENTITY: &'static str;

    /// Identity key within the platform.
    fn key(&self) -> &str;

    async fn upsert(&self, store: &dyn SyncStore, platform_id: DbId) -> StoreResult<Upserted>;

    /// Persist dependents of the row just upserted.
    async fn after_upsert(
        &self,
        _store: &dyn SyncStore,
        _platform_id: DbId,
        _id: DbId,
    ) -> StoreResult<()> {
        Ok(())
    }

    async fn deactivate_except(
        store: &dyn SyncStore,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64>;
}

/// Reconcile `records` for one platform.
///
/// Returns `Err` only when the store reports itself unavailable; any other
/// per-record failure is counted in `failed`.
pub async fn reconcile<R: Reconcile>(
    store: &dyn SyncStore,
    platform_id: DbId,
    records: &[R],
) -> Result<ReconcileOutcome, StoreError> {
    let mut outcome = ReconcileOutcome::default();
    let mut seen: Vec<String> = Vec::with_capacity(records.len());
    let mut seen_set: HashSet<&str> = HashSet::with_capacity(records.len());

    for record in records {
        let key = record.key();
        if seen_set.insert(key) {
            seen.push(key.to_string());
        } else {
            tracing::debug!(platform_id, entity = R::ENTITY, key, "Duplicate key in batch");
        }

        let persisted = match record.upsert(store, platform_id).await {
            Ok(upserted) => record
                .after_upsert(store, platform_id, upserted.id())
                .await
                .map(|()| upserted),
            Err(e) => Err(e),
        };

        match persisted {
            Ok(Upserted::Created(_)) => outcome.created += 1,
            Ok(Upserted::Updated(_)) => outcome.updated += 1,
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    platform_id,
                    entity = R::ENTITY,
                    key,
                    error = %e,
                    "Failed to persist record, skipping",
                );
                outcome.failed += 1;
            }
        }
    }

    match R::deactivate_except(store, platform_id, &seen).await {
        Ok(count) => {
            outcome.deactivated = count;
            if count > 0 {
                tracing::info!(
                    platform_id,
                    entity = R::ENTITY,
                    count,
                    "Deactivated records absent from inventory",
                );
            }
        }
        Err(e) => {
            tracing::error!(
                platform_id,
                entity = R::ENTITY,
                error = %e,
                "Bulk deactivation failed, skipping",
            );
            outcome.deactivation_skipped = true;
        }
    }

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[async_trait]
impl Reconcile for HostRecord {
    const ENTITY: &'static str = "host";

    fn key(&self) -> &str {
        &self.uuid
    }

    async fn upsert(&self, store: &dyn SyncStore, platform_id: DbId) -> StoreResult<Upserted> {
        store.upsert_host(platform_id, self).await
    }

    async fn deactivate_except(
        store: &dyn SyncStore,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        store.deactivate_hosts_except(platform_id, seen).await
    }
}

#[async_trait]
impl Reconcile for VmRecord {
    const ENTITY: &'static str = "vm";

    fn key(&self) -> &str {
        &self.uuid
    }

    async fn upsert(&self, store: &dyn SyncStore, platform_id: DbId) -> StoreResult<Upserted> {
        store.upsert_vm(platform_id, self).await
    }

    async fn after_upsert(
        &self,
        store: &dyn SyncStore,
        _platform_id: DbId,
        vm_id: DbId,
    ) -> StoreResult<()> {
        reconcile_vm_children(store, vm_id, self).await
    }

    async fn deactivate_except(
        store: &dyn SyncStore,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        store.deactivate_vms_except(platform_id, seen).await
    }
}

#[async_trait]
impl Reconcile for DatastoreRecord {
    const ENTITY: &'static str = "datastore";

    fn key(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, store: &dyn SyncStore, platform_id: DbId) -> StoreResult<Upserted> {
        store.upsert_datastore(platform_id, self).await
    }

    async fn after_upsert(
        &self,
        store: &dyn SyncStore,
        platform_id: DbId,
        datastore_id: DbId,
    ) -> StoreResult<()> {
        store
            .replace_datastore_hosts(platform_id, datastore_id, &self.host_names)
            .await
    }

    async fn deactivate_except(
        store: &dyn SyncStore,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        store.deactivate_datastores_except(platform_id, seen).await
    }
}

#[async_trait]
impl Reconcile for TemplateRecord {
    const ENTITY: &'static str = "template";

    fn key(&self) -> &str {
        &self.uuid
    }

    async fn upsert(&self, store: &dyn SyncStore, platform_id: DbId) -> StoreResult<Upserted> {
        store.upsert_template(platform_id, self).await
    }

    async fn deactivate_except(
        store: &dyn SyncStore,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        store.deactivate_templates_except(platform_id, seen).await
    }
}

/// Disks, NICs and snapshots of one VM. Children are hard-deleted when no
/// longer reported. Snapshot parent links are set in a second pass once
/// every node exists; a parent that was not reported leaves the node a root.
async fn reconcile_vm_children(
    store: &dyn SyncStore,
    vm_id: DbId,
    vm: &VmRecord,
) -> StoreResult<()> {
    for disk in &vm.disks {
        store.upsert_vm_disk(vm_id, disk).await?;
    }
    let disk_keys: Vec<i32> = vm.disks.iter().map(|d| d.device_key).collect();
    store.delete_vm_disks_except(vm_id, &disk_keys).await?;

    for nic in &vm.networks {
        store.upsert_vm_network(vm_id, nic).await?;
    }
    let nic_keys: Vec<i32> = vm.networks.iter().map(|n| n.device_key).collect();
    store.delete_vm_networks_except(vm_id, &nic_keys).await?;

    for snapshot in &vm.snapshots {
        store.upsert_vm_snapshot(vm_id, snapshot).await?;
    }
    let known: HashSet<i64> = vm.snapshots.iter().map(|s| s.snapshot_id).collect();
    for snapshot in &vm.snapshots {
        let parent = snapshot
            .parent_snapshot_id
            .filter(|parent| known.contains(parent));
        store
            .link_vm_snapshot(vm_id, snapshot.snapshot_id, parent)
            .await?;
    }
    let ids: Vec<i64> = known.into_iter().collect();
    store.delete_vm_snapshots_except(vm_id, &ids).await?;

    Ok(())
}
