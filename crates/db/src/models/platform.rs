//! Platform and credential models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use virtsync_core::status::{PlatformStatus, PlatformType, StatusId};
use virtsync_core::types::{DbId, Timestamp};

/// A managed virtualization endpoint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Platform {
    pub id: DbId,
    pub name: String,
    pub platform_type: String,
    pub address: String,
    pub port: i32,
    pub verify_tls: bool,
    pub status_id: StatusId,
    pub is_active: bool,
    pub region: String,
    pub datacenter: String,
    pub version: String,
    pub build: String,
    pub total_hosts: i32,
    pub total_vms: i32,
    pub total_clusters: i32,
    pub last_sync_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Platform {
    /// Parsed platform type; `None` for values written outside this crate.
    pub fn kind(&self) -> Option<PlatformType> {
        self.platform_type.parse().ok()
    }

    pub fn status(&self) -> Option<PlatformStatus> {
        PlatformStatus::from_id(self.status_id)
    }
}

/// DTO for registering a platform.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlatform {
    pub name: String,
    pub platform_type: PlatformType,
    pub address: String,
    pub port: Option<i32>,
    pub verify_tls: Option<bool>,
    pub region: Option<String>,
}

/// Login material for a platform. `secret` may be ciphertext.
#[derive(Debug, Clone, FromRow)]
pub struct PlatformCredential {
    pub id: DbId,
    pub platform_id: DbId,
    pub username: String,
    pub secret: String,
    pub session_token: Option<String>,
    pub session_expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
