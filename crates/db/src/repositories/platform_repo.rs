//! Repository for the `platforms` and `platform_credentials` tables.

use sqlx::PgPool;
use virtsync_core::records::PlatformInfoRecord;
use virtsync_core::status::{PlatformStatus, StatusId};
use virtsync_core::types::{DbId, Timestamp};

use crate::models::platform::{Platform, PlatformCredential};

/// Column list for `platforms` queries.
const COLUMNS: &str = "\
    id, name, platform_type, address, port, verify_tls, status_id, is_active, \
    region, datacenter, version, build, total_hosts, total_vms, total_clusters, \
    last_sync_at, created_at, updated_at";

const CREDENTIAL_COLUMNS: &str = "\
    id, platform_id, username, secret, session_token, session_expires_at, \
    created_at, updated_at";

/// Provides query operations for platforms.
pub struct PlatformRepo;

impl PlatformRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Platform>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM platforms WHERE id = $1");
        sqlx::query_as::<_, Platform>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<Platform>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM platforms WHERE is_active ORDER BY id");
        sqlx::query_as::<_, Platform>(&query).fetch_all(pool).await
    }

    pub async fn update_info(
        pool: &PgPool,
        id: DbId,
        info: &PlatformInfoRecord,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE platforms SET \
                 version = $2, build = $3, \
                 datacenter = CASE WHEN $4 = '' THEN datacenter ELSE $4 END, \
                 total_hosts = $5, total_vms = $6, total_clusters = $7, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&info.version)
        .bind(&info.build)
        .bind(&info.datacenter)
        .bind(info.total_hosts)
        .bind(info.total_vms)
        .bind(info.total_clusters)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the status and return the previous status id, or `None` if the
    /// platform does not exist.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: PlatformStatus,
    ) -> Result<Option<StatusId>, sqlx::Error> {
        // The FROM self-join reads the pre-update row.
        sqlx::query_scalar::<_, StatusId>(
            "UPDATE platforms p SET status_id = $2, updated_at = NOW() \
             FROM platforms old \
             WHERE p.id = $1 AND old.id = p.id \
             RETURNING old.status_id",
        )
        .bind(id)
        .bind(status.id())
        .fetch_optional(pool)
        .await
    }

    pub async fn touch_last_sync(
        pool: &PgPool,
        id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE platforms SET last_sync_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn find_credential(
        pool: &PgPool,
        platform_id: DbId,
    ) -> Result<Option<PlatformCredential>, sqlx::Error> {
        let query = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM platform_credentials WHERE platform_id = $1"
        );
        sqlx::query_as::<_, PlatformCredential>(&query)
            .bind(platform_id)
            .fetch_optional(pool)
            .await
    }
}
