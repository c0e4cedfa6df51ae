//! Persistence seams used by the sync pipeline.
//!
//! The pipeline never talks to sqlx directly; it goes through these traits so
//! the same orchestration runs against [`PgStore`](crate::pg::PgStore) in
//! production and [`MemoryStore`](crate::memory::MemoryStore) in tests.

use async_trait::async_trait;
use virtsync_core::records::{
    DatastoreRecord, HostMetricSample, HostRecord, PlatformInfoRecord, TemplateRecord,
    VmDiskRecord, VmMetricSample, VmNetworkRecord, VmRecord, VmSnapshotRecord,
};
use virtsync_core::status::{OperationStatus, PlatformStatus};
use virtsync_core::task_state::TaskState;
use virtsync_core::types::{DbId, Timestamp};

use crate::error::StoreResult;
use crate::models::operation::{
    CreateOperationLog, CreateOperationTask, FinishOperationLog, OperationLog, OperationTask,
};
use crate::models::platform::{Platform, PlatformCredential};

/// Outcome of an upsert keyed by (platform, identity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created(DbId),
    Updated(DbId),
}

impl Upserted {
    pub fn id(self) -> DbId {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Cheap round trip used by health checks.
    async fn ping(&self) -> StoreResult<()>;

    async fn find_platform(&self, id: DbId) -> StoreResult<Option<Platform>>;

    async fn list_active_platforms(&self) -> StoreResult<Vec<Platform>>;

    async fn find_credential(&self, platform_id: DbId) -> StoreResult<Option<PlatformCredential>>;

    /// Store version/build/datacenter and inventory totals.
    async fn update_platform_info(
        &self,
        platform_id: DbId,
        info: &PlatformInfoRecord,
    ) -> StoreResult<()>;

    /// Set the connection status, returning the previous one.
    async fn set_platform_status(
        &self,
        platform_id: DbId,
        status: PlatformStatus,
    ) -> StoreResult<PlatformStatus>;

    async fn touch_last_sync(&self, platform_id: DbId, at: Timestamp) -> StoreResult<()>;
}

/// Upsert and soft-delete primitives, one family per entity type.
///
/// `deactivate_*_except` flips `is_active` off for every active row of the
/// platform whose key is not in `seen`, returning the number of rows changed.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_host(&self, platform_id: DbId, record: &HostRecord) -> StoreResult<Upserted>;

    async fn deactivate_hosts_except(&self, platform_id: DbId, seen: &[String])
        -> StoreResult<u64>;

    /// Upsert a VM, linking it to the platform's host named `record.host_name`.
    async fn upsert_vm(&self, platform_id: DbId, record: &VmRecord) -> StoreResult<Upserted>;

    async fn deactivate_vms_except(&self, platform_id: DbId, seen: &[String]) -> StoreResult<u64>;

    async fn upsert_vm_disk(&self, vm_id: DbId, record: &VmDiskRecord) -> StoreResult<()>;

    async fn delete_vm_disks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64>;

    async fn upsert_vm_network(&self, vm_id: DbId, record: &VmNetworkRecord) -> StoreResult<()>;

    async fn delete_vm_networks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64>;

    async fn upsert_vm_snapshot(&self, vm_id: DbId, record: &VmSnapshotRecord)
        -> StoreResult<()>;

    async fn delete_vm_snapshots_except(&self, vm_id: DbId, ids: &[i64]) -> StoreResult<u64>;

    /// Point snapshot `snapshot_id` at `parent` (`None` makes it a root).
    async fn link_vm_snapshot(
        &self,
        vm_id: DbId,
        snapshot_id: i64,
        parent: Option<i64>,
    ) -> StoreResult<()>;

    async fn upsert_datastore(
        &self,
        platform_id: DbId,
        record: &DatastoreRecord,
    ) -> StoreResult<Upserted>;

    /// Atomically replace the hosts associated with a datastore. Names that
    /// match no host of the platform are ignored.
    async fn replace_datastore_hosts(
        &self,
        platform_id: DbId,
        datastore_id: DbId,
        host_names: &[String],
    ) -> StoreResult<()>;

    async fn deactivate_datastores_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64>;

    async fn upsert_template(
        &self,
        platform_id: DbId,
        record: &TemplateRecord,
    ) -> StoreResult<Upserted>;

    async fn deactivate_templates_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64>;
}

/// Append-only usage samples.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insert samples for hosts known to the platform; unknown uuids are
    /// skipped. Returns the number of rows written.
    async fn insert_host_metrics(
        &self,
        platform_id: DbId,
        samples: &[HostMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64>;

    async fn insert_vm_metrics(
        &self,
        platform_id: DbId,
        samples: &[VmMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64>;

    /// Delete samples collected before `cutoff`.
    async fn prune_metrics(&self, cutoff: Timestamp) -> StoreResult<u64>;
}

/// Operation tasks and operation logs.
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn create_task(&self, input: &CreateOperationTask) -> StoreResult<OperationTask>;

    async fn find_task(&self, correlation_id: &str) -> StoreResult<Option<OperationTask>>;

    /// Persist a task's lifecycle state, provided its stored status is still
    /// `expected`. Returns `false` if no task has that correlation id or its
    /// status moved on since it was read.
    async fn save_task_state(
        &self,
        correlation_id: &str,
        expected: OperationStatus,
        state: &TaskState,
    ) -> StoreResult<bool>;

    async fn create_log(&self, input: &CreateOperationLog) -> StoreResult<OperationLog>;

    async fn finish_log(&self, id: DbId, input: &FinishOperationLog) -> StoreResult<()>;
}

/// Everything the sync pipeline needs from persistence.
pub trait SyncStore: PlatformStore + InventoryStore + MetricsStore + OperationStore {}

impl<T> SyncStore for T where T: PlatformStore + InventoryStore + MetricsStore + OperationStore {}
