//! Host and VM usage samples (append-only).

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::types::{DbId, Timestamp};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HostMetric {
    pub id: DbId,
    pub host_id: DbId,
    pub cpu_usage_percent: f64,
    pub cpu_usage_mhz: i64,
    pub memory_usage_percent: f64,
    pub memory_used_mb: i64,
    pub uptime_secs: i64,
    pub collected_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VmMetric {
    pub id: DbId,
    pub vm_id: DbId,
    pub cpu_usage_percent: f64,
    pub cpu_usage_mhz: i64,
    pub memory_usage_percent: f64,
    pub memory_used_mb: i64,
    pub collected_at: Timestamp,
}
