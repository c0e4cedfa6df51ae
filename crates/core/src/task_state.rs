//! OperationTask transition rules.
//!
//! ```text
//! pending ──► running ──► success
//!    │           │  └───► failed
//!    │           └──────► cancelled
//!    ├──────────────────► failed
//!    └──────────────────► cancelled
//! ```
//!
//! Start time is stamped on the first transition into `running` only. End
//! time and duration are stamped on the first terminal transition only, and a
//! terminal task accepts no further updates.

use serde_json::Value;

use crate::status::OperationStatus;
use crate::types::Timestamp;

/// Mutable portion of an OperationTask.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskState {
    pub status: OperationStatus,
    pub progress: i16,
    pub current_step: String,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub duration_secs: Option<i64>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::pending()
    }
}

/// A partial update addressed to a task. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<OperationStatus>,
    pub progress: Option<i16>,
    pub current_step: Option<String>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: OperationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: i16, step: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            current_step: Some(step.into()),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("task is already {0} and accepts no further updates")]
    Terminal(OperationStatus),

    #[error("invalid task transition {from} -> {to}")]
    Invalid {
        from: OperationStatus,
        to: OperationStatus,
    },
}

fn is_allowed(from: OperationStatus, to: OperationStatus) -> bool {
    use OperationStatus::*;
    matches!(
        (from, to),
        (Pending, Pending)
            | (Pending, Running)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Running, Running)
            | (Running, Success)
            | (Running, Failed)
            | (Running, Cancelled)
    )
}

impl TaskState {
    pub fn pending() -> Self {
        Self {
            status: OperationStatus::Pending,
            progress: 0,
            current_step: String::new(),
            result: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            duration_secs: None,
        }
    }

    /// Apply `update` at time `now`, returning the next state.
    pub fn apply(&self, update: TaskUpdate, now: Timestamp) -> Result<TaskState, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }

        let mut next = self.clone();

        if let Some(to) = update.status {
            if !is_allowed(self.status, to) {
                return Err(TransitionError::Invalid {
                    from: self.status,
                    to,
                });
            }
            if to == OperationStatus::Running && next.started_at.is_none() {
                next.started_at = Some(now);
            }
            if to.is_terminal() {
                next.completed_at = Some(now);
                next.duration_secs = Some(
                    next.started_at
                        .map(|start| (now - start).num_seconds().max(0))
                        .unwrap_or(0),
                );
                if to == OperationStatus::Success {
                    next.progress = 100;
                }
            }
            next.status = to;
        }

        if let Some(progress) = update.progress {
            next.progress = progress.clamp(0, 100);
        }
        if let Some(step) = update.current_step {
            next.current_step = step;
        }
        if update.result.is_some() {
            next.result = update.result;
        }
        if update.error_message.is_some() {
            next.error_message = update.error_message;
        }

        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
