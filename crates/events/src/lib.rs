//! Sync lifecycle events and notification delivery.
//!
//! - [`SyncEvent`]: sync-completed, sync-failed and status-changed events.
//! - [`EventSink`]: the seam the orchestrator emits through.
//! - [`EventBus`]: in-process fan-out backed by `tokio::sync::broadcast`.
//! - [`NotificationRouter`]: turns events into [`Notification`]s and
//!   delivers them through an optional webhook.

pub mod bus;
pub mod delivery;
pub mod notify;
pub mod sink;

pub use bus::{EventBus, SyncEvent};
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use notify::{Notification, NotificationLevel, NotificationRouter};
pub use sink::{EventSink, RecordingSink};
