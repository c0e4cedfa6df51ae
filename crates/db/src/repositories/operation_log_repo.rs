//! Repository for the `operation_logs` table.

use sqlx::PgPool;
use virtsync_core::status::OperationStatus;
use virtsync_core::types::DbId;

use crate::models::operation::{CreateOperationLog, FinishOperationLog, OperationLog};

const COLUMNS: &str = "\
    id, operation_type, operator, target_type, target_id, target_name, status_id, \
    result, error_message, parameters, started_at, completed_at, duration_secs, created_at";

pub struct OperationLogRepo;

impl OperationLogRepo {
    /// Open a log entry in the `running` state.
    pub async fn create(
        pool: &PgPool,
        input: &CreateOperationLog,
    ) -> Result<OperationLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO operation_logs \
                 (operation_type, operator, target_type, target_id, target_name, \
                  status_id, parameters) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationLog>(&query)
            .bind(input.operation_type.as_str())
            .bind(&input.operator)
            .bind(&input.target_type)
            .bind(input.target_id)
            .bind(&input.target_name)
            .bind(OperationStatus::Running.id())
            .bind(&input.parameters)
            .fetch_one(pool)
            .await
    }

    /// Close a log entry. Only rows still open are touched.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        input: &FinishOperationLog,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE operation_logs SET \
                 status_id = $2, result = $3, error_message = $4, completed_at = $5, \
                 duration_secs = GREATEST(0, EXTRACT(EPOCH FROM ($5 - started_at))::BIGINT) \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(input.status.id())
        .bind(&input.result)
        .bind(&input.error_message)
        .bind(input.completed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
