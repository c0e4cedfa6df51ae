//! Datastore models.

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::types::{DbId, Timestamp};

/// A datastore row, unique per (platform_id, name).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Datastore {
    pub id: DbId,
    pub platform_id: DbId,
    pub name: String,
    pub mo_ref: String,
    pub url: String,
    pub datastore_type: String,
    pub access_mode: String,
    pub datacenter_name: String,
    pub capacity_gb: i64,
    pub free_gb: i64,
    pub uncommitted_gb: i64,
    pub usage_percent: f64,
    pub vm_count: i32,
    pub nfs_server: String,
    pub nfs_path: String,
    pub is_accessible: bool,
    pub is_maintenance: bool,
    pub multiple_host_access: bool,
    pub is_active: bool,
    pub last_sync_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
