//! Operation task and operation log models.

use serde::Serialize;
use sqlx::FromRow;
use virtsync_core::status::{OperationStatus, OperationType, StatusId, TaskType};
use virtsync_core::task_state::TaskState;
use virtsync_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Operation tasks
// ---------------------------------------------------------------------------

/// An asynchronous operation, addressed by its correlation id.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperationTask {
    pub id: DbId,
    pub correlation_id: String,
    pub task_type: String,
    pub name: String,
    pub platform_id: Option<DbId>,
    pub status_id: StatusId,
    pub progress: i16,
    pub current_step: String,
    pub parameters: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub scheduled_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub duration_secs: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OperationTask {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_id(self.status_id).unwrap_or(OperationStatus::Pending)
    }

    /// The mutable lifecycle portion of the row.
    pub fn state(&self) -> TaskState {
        TaskState {
            status: self.status(),
            progress: self.progress,
            current_step: self.current_step.clone(),
            result: self.result.clone(),
            error_message: self.error_message.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_secs: self.duration_secs,
        }
    }
}

/// DTO for creating an operation task.
#[derive(Debug, Clone)]
pub struct CreateOperationTask {
    pub correlation_id: String,
    pub task_type: TaskType,
    pub name: String,
    pub platform_id: Option<DbId>,
    pub parameters: Option<serde_json::Value>,
    pub scheduled_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Operation logs
// ---------------------------------------------------------------------------

/// Audit record of an operator-triggered action.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperationLog {
    pub id: DbId,
    pub operation_type: String,
    pub operator: String,
    pub target_type: String,
    pub target_id: Option<DbId>,
    pub target_name: String,
    pub status_id: StatusId,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub duration_secs: Option<i64>,
    pub created_at: Timestamp,
}

impl OperationLog {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_id(self.status_id).unwrap_or(OperationStatus::Running)
    }
}

/// DTO for opening an operation log entry (status `running`).
#[derive(Debug, Clone)]
pub struct CreateOperationLog {
    pub operation_type: OperationType,
    pub operator: String,
    pub target_type: String,
    pub target_id: Option<DbId>,
    pub target_name: String,
    pub parameters: Option<serde_json::Value>,
}

/// DTO for closing an operation log entry.
#[derive(Debug, Clone)]
pub struct FinishOperationLog {
    pub status: OperationStatus,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: Timestamp,
}
