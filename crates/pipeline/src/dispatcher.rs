//! In-process job dispatch and status lookup.
//!
//! [`LocalDispatcher`] runs submitted jobs on the tokio runtime, at most
//! `max_concurrent` at a time, and remembers their outcome under the
//! correlation id it hands back. Status queries for ids it does not know
//! (another process, or a restart) fall back to the OperationTask table.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use virtsync_core::status::OperationStatus;
use virtsync_db::models::operation::OperationTask;
use virtsync_db::SyncStore;

use crate::error::SyncError;

/// Finished job outcomes are kept this long for status queries.
const RESULT_TTL: Duration = Duration::from_secs(3600);

/// A unit of work. Receives its correlation id.
pub type Job = Box<dyn FnOnce(String) -> BoxFuture<'static, Result<Value, SyncError>> + Send>;

/// Box an async closure as a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: FnOnce(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, SyncError>> + Send + 'static,
{
    Box::new(move |correlation_id| f(correlation_id).boxed())
}

/// Runs jobs in the background.
pub trait Dispatcher: Send + Sync {
    /// Queue `job` and return its correlation id immediately.
    fn submit(&self, label: &'static str, job: Job) -> String;

    /// Like [`submit`](Dispatcher::submit) but outside the concurrency
    /// limit. For jobs that mostly wait on other jobs.
    fn submit_unbounded(&self, label: &'static str, job: Job) -> String {
        self.submit(label, job)
    }
}

/// Answers "where is job X".
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn status(&self, correlation_id: &str) -> Option<JobStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Started,
    Success,
    Failure,
    Revoked,
}

impl JobState {
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }
}

impl From<OperationStatus> for JobState {
    fn from(status: OperationStatus) -> Self {
        match status {
            OperationStatus::Pending => Self::Pending,
            OperationStatus::Running => Self::Started,
            OperationStatus::Success => Self::Success,
            OperationStatus::Failed => Self::Failure,
            OperationStatus::Cancelled => Self::Revoked,
        }
    }
}

/// Status of a dispatched job as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub task_id: String,
    pub status: JobState,
    pub ready: bool,
    /// `None` until the job is ready.
    pub successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    fn new(task_id: &str, status: JobState) -> Self {
        let ready = status.is_ready();
        Self {
            task_id: task_id.to_string(),
            status,
            ready,
            successful: ready.then_some(status == JobState::Success),
            result: None,
            error: None,
        }
    }

    /// Status for an id no dispatcher or store knows about. Reported as
    /// pending: the job may not have been picked up yet.
    pub fn unknown(task_id: &str) -> Self {
        Self::new(task_id, JobState::Pending)
    }

    fn finished(task_id: &str, outcome: Result<Value, String>, revoked: bool) -> Self {
        match outcome {
            Ok(value) => Self {
                result: Some(value),
                ..Self::new(task_id, JobState::Success)
            },
            Err(error) => Self {
                error: Some(error),
                ..Self::new(
                    task_id,
                    if revoked {
                        JobState::Revoked
                    } else {
                        JobState::Failure
                    },
                )
            },
        }
    }

    /// Derive a status from a persisted OperationTask.
    pub fn from_task(task: &OperationTask) -> Self {
        let state = JobState::from(task.status());
        let mut status = Self::new(&task.correlation_id, state);
        match state {
            JobState::Success => status.result = task.result.clone(),
            JobState::Failure | JobState::Revoked => {
                status.error = Some(
                    task.error_message
                        .clone()
                        .unwrap_or_else(|| "cancelled".to_string()),
                );
            }
            JobState::Pending | JobState::Started => {}
        }
        status
    }
}

struct Entry {
    status: JobStatus,
    finished_at: Option<Instant>,
}

#[derive(Default)]
struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Registry {
    fn set(&self, status: JobStatus) {
        let finished_at = status.ready.then(Instant::now);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            status.task_id.clone(),
            Entry {
                status,
                finished_at,
            },
        );
    }

    fn get(&self, correlation_id: &str) -> Option<JobStatus> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(correlation_id).map(|e| e.status.clone())
    }

    fn prune(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| {
            !matches!(e.finished_at, Some(finished) if now.duration_since(finished) >= RESULT_TTL)
        });
    }
}

/// Bounded in-process worker pool.
#[derive(Clone)]
pub struct LocalDispatcher {
    permits: Arc<Semaphore>,
    registry: Arc<Registry>,
    tasks: TaskTracker,
    store: Option<Arc<dyn SyncStore>>,
}

impl LocalDispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            registry: Arc::new(Registry::default()),
            tasks: TaskTracker::new(),
            store: None,
        }
    }

    /// Fall back to OperationTasks in `store` for unknown correlation ids.
    pub fn with_store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wait for queued and running jobs, up to `timeout`. Returns `false`
    /// if some were still running.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let drained = tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok();
        if !drained {
            tracing::warn!(running = self.tasks.len(), "Dispatcher shutdown timed out");
        }
        drained
    }

    pub fn running(&self) -> usize {
        self.tasks.len()
    }
}

impl LocalDispatcher {
    fn spawn_job(&self, label: &'static str, job: Job, bounded: bool) -> String {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.registry.prune();
        self.registry.set(JobStatus::new(&correlation_id, JobState::Pending));

        let permits = bounded.then(|| Arc::clone(&self.permits));
        let registry = Arc::clone(&self.registry);
        let cid = correlation_id.clone();

        self.tasks.spawn(async move {
            let _permit = match permits {
                Some(permits) => match permits.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        registry.set(JobStatus::finished(
                            &cid,
                            Err("dispatcher closed".into()),
                            false,
                        ));
                        return;
                    }
                },
                None => None,
            };
            registry.set(JobStatus::new(&cid, JobState::Started));
            tracing::debug!(job = label, correlation_id = %cid, "Job started");

            let outcome = AssertUnwindSafe(job(cid.clone())).catch_unwind().await;
            let status = match outcome {
                Ok(Ok(value)) => JobStatus::finished(&cid, Ok(value), false),
                Ok(Err(SyncError::Cancelled)) => {
                    JobStatus::finished(&cid, Err(SyncError::Cancelled.to_string()), true)
                }
                Ok(Err(e)) => JobStatus::finished(&cid, Err(e.to_string()), false),
                Err(_) => {
                    tracing::error!(job = label, correlation_id = %cid, "Job panicked");
                    JobStatus::finished(&cid, Err("job panicked".into()), false)
                }
            };
            tracing::debug!(
                job = label,
                correlation_id = %cid,
                status = ?status.status,
                "Job finished",
            );
            registry.set(status);
        });

        correlation_id
    }
}

impl Dispatcher for LocalDispatcher {
    fn submit(&self, label: &'static str, job: Job) -> String {
        self.spawn_job(label, job, true)
    }

    fn submit_unbounded(&self, label: &'static str, job: Job) -> String {
        self.spawn_job(label, job, false)
    }
}

#[async_trait]
impl StatusStore for LocalDispatcher {
    async fn status(&self, correlation_id: &str) -> Option<JobStatus> {
        if let Some(status) = self.registry.get(correlation_id) {
            return Some(status);
        }
        let store = self.store.as_ref()?;
        match store.find_task(correlation_id).await {
            Ok(task) => task.as_ref().map(JobStatus::from_task),
            Err(e) => {
                tracing::warn!(correlation_id, error = %e, "Failed to look up task status");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
