//! Repository for the `vm_templates` table.

use sqlx::PgPool;
use virtsync_core::records::TemplateRecord;
use virtsync_core::types::DbId;

pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn upsert(
        pool: &PgPool,
        platform_id: DbId,
        rec: &TemplateRecord,
    ) -> Result<(DbId, bool), sqlx::Error> {
        sqlx::query_as::<_, (DbId, bool)>(
            "INSERT INTO vm_templates \
                 (platform_id, uuid, name, display_name, mo_ref, os_type, \
                  cpu_count, memory_mb, disk_gb, category) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (platform_id, uuid) DO UPDATE SET \
                 name = EXCLUDED.name, display_name = EXCLUDED.display_name, \
                 mo_ref = EXCLUDED.mo_ref, os_type = EXCLUDED.os_type, \
                 cpu_count = EXCLUDED.cpu_count, memory_mb = EXCLUDED.memory_mb, \
                 disk_gb = EXCLUDED.disk_gb, category = EXCLUDED.category, \
                 is_active = TRUE, updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(platform_id)
        .bind(&rec.uuid)
        .bind(&rec.name)
        .bind(&rec.display_name)
        .bind(&rec.mo_ref)
        .bind(rec.os_type.as_str())
        .bind(rec.cpu_count)
        .bind(rec.memory_mb)
        .bind(rec.disk_gb)
        .bind(&rec.category)
        .fetch_one(pool)
        .await
    }

    pub async fn deactivate_except(
        pool: &PgPool,
        platform_id: DbId,
        seen: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE vm_templates SET is_active = FALSE, updated_at = NOW() \
             WHERE platform_id = $1 AND is_active AND NOT (uuid = ANY($2))",
        )
        .bind(platform_id)
        .bind(seen)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
