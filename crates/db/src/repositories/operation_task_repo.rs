//! Repository for the `operation_tasks` table.

use sqlx::PgPool;
use virtsync_core::status::OperationStatus;
use virtsync_core::task_state::TaskState;

use crate::models::operation::{CreateOperationTask, OperationTask};

const COLUMNS: &str = "\
    id, correlation_id, task_type, name, platform_id, status_id, progress, \
    current_step, parameters, result, error_message, scheduled_at, started_at, \
    completed_at, duration_secs, created_at, updated_at";

pub struct OperationTaskRepo;

impl OperationTaskRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateOperationTask,
    ) -> Result<OperationTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO operation_tasks \
                 (correlation_id, task_type, name, platform_id, parameters, scheduled_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperationTask>(&query)
            .bind(&input.correlation_id)
            .bind(input.task_type.as_str())
            .bind(&input.name)
            .bind(input.platform_id)
            .bind(&input.parameters)
            .bind(input.scheduled_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_correlation_id(
        pool: &PgPool,
        correlation_id: &str,
    ) -> Result<Option<OperationTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM operation_tasks WHERE correlation_id = $1");
        sqlx::query_as::<_, OperationTask>(&query)
            .bind(correlation_id)
            .fetch_optional(pool)
            .await
    }

    /// Write the lifecycle columns. Returns `false` if no row matched.
    /// Compare-and-set on `status_id`: a concurrent transition makes this a
    /// no-op.
    pub async fn save_state(
        pool: &PgPool,
        correlation_id: &str,
        expected: OperationStatus,
        state: &TaskState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE operation_tasks SET \
                 status_id = $2, progress = $3, current_step = $4, result = $5, \
                 error_message = $6, started_at = $7, completed_at = $8, \
                 duration_secs = $9, updated_at = NOW() \
             WHERE correlation_id = $1 AND status_id = $10",
        )
        .bind(correlation_id)
        .bind(state.status.id())
        .bind(state.progress)
        .bind(&state.current_step)
        .bind(&state.result)
        .bind(&state.error_message)
        .bind(state.started_at)
        .bind(state.completed_at)
        .bind(state.duration_secs)
        .bind(expected.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
