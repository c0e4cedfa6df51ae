//! The inventory sync pipeline.
//!
//! - [`steps`] / [`reconcile`]: fetch one entity kind from a platform,
//!   normalize it and reconcile it against the store.
//! - [`orchestrator`]: full and single-step syncs under an OperationTask.
//! - [`tracker`]: task state transitions, progress and cancellation.
//! - [`throttle`]: per-platform rate limit on operator triggers.
//! - [`dispatcher`]: background job execution and status lookup.
//! - [`scheduler`]: periodic full-sync and metrics sweeps.
//! - [`audit`]: operation log entries around operator actions.
//! - [`service`]: the entry points the API and worker call.

pub mod audit;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod steps;
pub mod throttle;
pub mod tracker;

pub use audit::AuditScope;
pub use config::SyncConfig;
pub use context::SyncContext;
pub use dispatcher::{Dispatcher, JobState, JobStatus, LocalDispatcher, StatusStore};
pub use error::SyncError;
pub use orchestrator::Orchestrator;
pub use scheduler::{Scheduler, SweepSummary};
pub use service::{SyncService, SyncType, Triggered};
pub use throttle::ThrottleGuard;
pub use tracker::TaskTracker;
