//! Host models.

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::status::StatusId;
use virtsync_core::types::{DbId, Timestamp};

/// A compute host row, unique per (platform_id, uuid).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Host {
    pub id: DbId,
    pub platform_id: DbId,
    pub uuid: String,
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub mo_ref: String,
    pub cluster_name: String,
    pub datacenter_name: String,
    pub status_id: StatusId,
    pub power_state: String,
    pub connection_state: String,
    pub vendor: String,
    pub model: String,
    pub esxi_version: String,
    pub esxi_build: String,
    pub cpu_model: String,
    pub cpu_cores: i32,
    pub cpu_threads: i32,
    pub cpu_sockets: i32,
    pub cpu_frequency_mhz: i32,
    pub memory_total_mb: i64,
    pub vm_count: i32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub in_maintenance: bool,
    pub is_active: bool,
    pub last_seen_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
