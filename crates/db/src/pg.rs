//! PostgreSQL-backed [`SyncStore`](crate::store::SyncStore).

use async_trait::async_trait;
use sqlx::PgPool;
use virtsync_core::records::{
    DatastoreRecord, HostMetricSample, HostRecord, PlatformInfoRecord, TemplateRecord,
    VmDiskRecord, VmMetricSample, VmNetworkRecord, VmRecord, VmSnapshotRecord,
};
use virtsync_core::status::{OperationStatus, PlatformStatus};
use virtsync_core::task_state::TaskState;
use virtsync_core::types::{DbId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::models::operation::{
    CreateOperationLog, CreateOperationTask, FinishOperationLog, OperationLog, OperationTask,
};
use crate::models::platform::{Platform, PlatformCredential};
use crate::repositories::{
    DatastoreRepo, HostRepo, MetricsRepo, OperationLogRepo, OperationTaskRepo, PlatformRepo,
    TemplateRepo, VmRepo,
};
use crate::store::{InventoryStore, MetricsStore, OperationStore, PlatformStore, Upserted};

fn upserted((id, inserted): (DbId, bool)) -> Upserted {
    if inserted {
        Upserted::Created(id)
    } else {
        Upserted::Updated(id)
    }
}

/// Store backed by the repositories in [`crate::repositories`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlatformStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }

    async fn find_platform(&self, id: DbId) -> StoreResult<Option<Platform>> {
        Ok(PlatformRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_active_platforms(&self) -> StoreResult<Vec<Platform>> {
        Ok(PlatformRepo::list_active(&self.pool).await?)
    }

    async fn find_credential(&self, platform_id: DbId) -> StoreResult<Option<PlatformCredential>> {
        Ok(PlatformRepo::find_credential(&self.pool, platform_id).await?)
    }

    async fn update_platform_info(
        &self,
        platform_id: DbId,
        info: &PlatformInfoRecord,
    ) -> StoreResult<()> {
        if PlatformRepo::update_info(&self.pool, platform_id, info).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                entity: "platform",
                id: platform_id,
            })
        }
    }

    async fn set_platform_status(
        &self,
        platform_id: DbId,
        status: PlatformStatus,
    ) -> StoreResult<PlatformStatus> {
        let previous = PlatformRepo::set_status(&self.pool, platform_id, status)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "platform",
                id: platform_id,
            })?;
        Ok(PlatformStatus::from_id(previous).unwrap_or(PlatformStatus::Disconnected))
    }

    async fn touch_last_sync(&self, platform_id: DbId, at: Timestamp) -> StoreResult<()> {
        Ok(PlatformRepo::touch_last_sync(&self.pool, platform_id, at).await?)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn upsert_host(&self, platform_id: DbId, record: &HostRecord) -> StoreResult<Upserted> {
        Ok(upserted(HostRepo::upsert(&self.pool, platform_id, record).await?))
    }

    async fn deactivate_hosts_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        Ok(HostRepo::deactivate_except(&self.pool, platform_id, seen).await?)
    }

    async fn upsert_vm(&self, platform_id: DbId, record: &VmRecord) -> StoreResult<Upserted> {
        Ok(upserted(VmRepo::upsert(&self.pool, platform_id, record).await?))
    }

    async fn deactivate_vms_except(&self, platform_id: DbId, seen: &[String]) -> StoreResult<u64> {
        Ok(VmRepo::deactivate_except(&self.pool, platform_id, seen).await?)
    }

    async fn upsert_vm_disk(&self, vm_id: DbId, record: &VmDiskRecord) -> StoreResult<()> {
        Ok(VmRepo::upsert_disk(&self.pool, vm_id, record).await?)
    }

    async fn delete_vm_disks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64> {
        Ok(VmRepo::delete_disks_except(&self.pool, vm_id, keys).await?)
    }

    async fn upsert_vm_network(&self, vm_id: DbId, record: &VmNetworkRecord) -> StoreResult<()> {
        Ok(VmRepo::upsert_network(&self.pool, vm_id, record).await?)
    }

    async fn delete_vm_networks_except(&self, vm_id: DbId, keys: &[i32]) -> StoreResult<u64> {
        Ok(VmRepo::delete_networks_except(&self.pool, vm_id, keys).await?)
    }

    async fn upsert_vm_snapshot(
        &self,
        vm_id: DbId,
        record: &VmSnapshotRecord,
    ) -> StoreResult<()> {
        Ok(VmRepo::upsert_snapshot(&self.pool, vm_id, record).await?)
    }

    async fn delete_vm_snapshots_except(&self, vm_id: DbId, ids: &[i64]) -> StoreResult<u64> {
        Ok(VmRepo::delete_snapshots_except(&self.pool, vm_id, ids).await?)
    }

    async fn link_vm_snapshot(
        &self,
        vm_id: DbId,
        snapshot_id: i64,
        parent: Option<i64>,
    ) -> StoreResult<()> {
        Ok(VmRepo::link_snapshot(&self.pool, vm_id, snapshot_id, parent).await?)
    }

    async fn upsert_datastore(
        &self,
        platform_id: DbId,
        record: &DatastoreRecord,
    ) -> StoreResult<Upserted> {
        Ok(upserted(
            DatastoreRepo::upsert(&self.pool, platform_id, record).await?,
        ))
    }

    async fn replace_datastore_hosts(
        &self,
        platform_id: DbId,
        datastore_id: DbId,
        host_names: &[String],
    ) -> StoreResult<()> {
        Ok(DatastoreRepo::replace_hosts(&self.pool, platform_id, datastore_id, host_names).await?)
    }

    async fn deactivate_datastores_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        Ok(DatastoreRepo::deactivate_except(&self.pool, platform_id, seen).await?)
    }

    async fn upsert_template(
        &self,
        platform_id: DbId,
        record: &TemplateRecord,
    ) -> StoreResult<Upserted> {
        Ok(upserted(
            TemplateRepo::upsert(&self.pool, platform_id, record).await?,
        ))
    }

    async fn deactivate_templates_except(
        &self,
        platform_id: DbId,
        seen: &[String],
    ) -> StoreResult<u64> {
        Ok(TemplateRepo::deactivate_except(&self.pool, platform_id, seen).await?)
    }
}

#[async_trait]
impl MetricsStore for PgStore {
    async fn insert_host_metrics(
        &self,
        platform_id: DbId,
        samples: &[HostMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64> {
        let mut written = 0;
        for sample in samples {
            if MetricsRepo::insert_host_sample(&self.pool, platform_id, sample, collected_at)
                .await?
            {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn insert_vm_metrics(
        &self,
        platform_id: DbId,
        samples: &[VmMetricSample],
        collected_at: Timestamp,
    ) -> StoreResult<u64> {
        let mut written = 0;
        for sample in samples {
            if MetricsRepo::insert_vm_sample(&self.pool, platform_id, sample, collected_at).await?
            {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn prune_metrics(&self, cutoff: Timestamp) -> StoreResult<u64> {
        Ok(MetricsRepo::delete_older_than(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl OperationStore for PgStore {
    async fn create_task(&self, input: &CreateOperationTask) -> StoreResult<OperationTask> {
        OperationTaskRepo::create(&self.pool, input)
            .await
            .map_err(|e| {
                let duplicate =
                    matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
                if duplicate {
                    StoreError::Constraint(format!(
                        "duplicate correlation id {}",
                        input.correlation_id
                    ))
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_task(&self, correlation_id: &str) -> StoreResult<Option<OperationTask>> {
        Ok(OperationTaskRepo::find_by_correlation_id(&self.pool, correlation_id).await?)
    }

    async fn save_task_state(
        &self,
        correlation_id: &str,
        expected: OperationStatus,
        state: &TaskState,
    ) -> StoreResult<bool> {
        Ok(OperationTaskRepo::save_state(&self.pool, correlation_id, expected, state).await?)
    }

    async fn create_log(&self, input: &CreateOperationLog) -> StoreResult<OperationLog> {
        Ok(OperationLogRepo::create(&self.pool, input).await?)
    }

    async fn finish_log(&self, id: DbId, input: &FinishOperationLog) -> StoreResult<()> {
        OperationLogRepo::finish(&self.pool, id, input).await?;
        Ok(())
    }
}
