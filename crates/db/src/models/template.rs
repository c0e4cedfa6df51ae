//! VM template models.

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::types::{DbId, Timestamp};

/// A template row, unique per (platform_id, uuid).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VmTemplate {
    pub id: DbId,
    pub platform_id: DbId,
    pub uuid: String,
    pub name: String,
    pub display_name: String,
    pub mo_ref: String,
    pub os_type: String,
    pub cpu_count: i32,
    pub memory_mb: i64,
    pub disk_gb: i64,
    pub category: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
