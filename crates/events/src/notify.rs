//! Notification routing.
//!
//! [`NotificationRouter`] subscribes to the [`EventBus`](crate::EventBus),
//! renders each [`SyncEvent`] into a [`Notification`], logs it at a level
//! matching its severity, and hands it to the webhook when one is configured.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use virtsync_core::status::PlatformStatus;
use virtsync_core::types::{DbId, Timestamp};

use crate::bus::SyncEvent;
use crate::delivery::webhook::WebhookDelivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Danger,
}

/// A rendered, deliverable notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub event_type: &'static str,
    pub platform_id: DbId,
    pub platform_name: String,
    pub subject: String,
    pub message: String,
    pub level: NotificationLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_synced: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_failed: Option<u64>,
    pub timestamp: Timestamp,
}

/// Routes sync events to notification channels.
#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    webhook: Option<WebhookDelivery>,
}

impl NotificationRouter {
    pub fn new(webhook: Option<WebhookDelivery>) -> Self {
        Self { webhook }
    }

    /// Render an event. Status changes into `Error` are danger, into
    /// `Connected` success, anything else a warning.
    pub fn render(event: &SyncEvent) -> Notification {
        let base = |subject: String, message: String, level| Notification {
            event_type: event.event_type(),
            platform_id: event.platform_id(),
            platform_name: event.platform_name().to_string(),
            subject,
            message,
            level,
            total_synced: None,
            total_failed: None,
            timestamp: Utc::now(),
        };

        match event {
            SyncEvent::SyncCompleted {
                platform_name,
                summary,
                ..
            } => {
                let (synced, failed) = (summary.total_synced(), summary.total_failed());
                let mut message =
                    format!("Synced {synced} records, {failed} failed.");
                for step in summary.failed_steps() {
                    message.push_str(&format!(
                        " Step {} failed: {}.",
                        step.step,
                        step.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                Notification {
                    total_synced: Some(synced),
                    total_failed: Some(failed),
                    ..base(
                        format!("Platform {platform_name} synchronization completed"),
                        message,
                        NotificationLevel::Success,
                    )
                }
            }
            SyncEvent::SyncFailed {
                platform_name,
                error,
                ..
            } => base(
                format!("Platform {platform_name} synchronization failed"),
                error.clone(),
                NotificationLevel::Danger,
            ),
            SyncEvent::StatusChanged {
                platform_name,
                old_status,
                new_status,
                ..
            } => {
                let level = match new_status {
                    PlatformStatus::Error => NotificationLevel::Danger,
                    PlatformStatus::Connected => NotificationLevel::Success,
                    _ => NotificationLevel::Warning,
                };
                base(
                    format!("Platform {platform_name} status changed"),
                    format!("{old_status} -> {new_status}"),
                    level,
                )
            }
        }
    }

    /// Render, log and deliver one event. Delivery failures are logged.
    pub async fn dispatch(&self, event: &SyncEvent) -> Notification {
        let notification = Self::render(event);
        match notification.level {
            NotificationLevel::Danger => tracing::error!(
                platform_id = notification.platform_id,
                subject = %notification.subject,
                message = %notification.message,
                "Sync notification",
            ),
            NotificationLevel::Warning => tracing::warn!(
                platform_id = notification.platform_id,
                subject = %notification.subject,
                message = %notification.message,
                "Sync notification",
            ),
            NotificationLevel::Success => tracing::info!(
                platform_id = notification.platform_id,
                subject = %notification.subject,
                message = %notification.message,
                "Sync notification",
            ),
        }

        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.deliver(&notification).await {
                tracing::error!(
                    platform_id = notification.platform_id,
                    url = webhook.url(),
                    error = %e,
                    "Failed to deliver sync notification",
                );
            }
        }
        notification
    }

    /// Route every event received until the bus closes.
    pub async fn run(self, mut receiver: broadcast::Receiver<SyncEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.dispatch(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification router lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification router shutting down");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use virtsync_core::report::{StepReport, SyncReport, SyncStep};

    use super::*;
    use crate::bus::EventBus;

    fn completed() -> SyncEvent {
        let ok = StepReport {
            step: SyncStep::Hosts,
            success: true,
            synced_count: 2,
            failed_count: 1,
            created_count: 2,
            updated_count: 0,
            attempts: 1,
            error: None,
            detail: None,
        };
        SyncEvent::SyncCompleted {
            platform_id: 4,
            platform_name: "vc04".into(),
            summary: SyncReport {
                success: true,
                platform_id: 4,
                platform_name: "vc04".into(),
                results: vec![ok, StepReport::failed(SyncStep::Vms, 3, "connection reset")],
                sync_time: Utc::now(),
            },
        }
    }

    #[test]
    fn completed_sync_reports_totals_and_failed_steps() {
        let n = NotificationRouter::render(&completed());
        assert_eq!(n.level, NotificationLevel::Success);
        assert_eq!(n.subject, "Platform vc04 synchronization completed");
        assert_eq!(n.total_synced, Some(2));
        assert_eq!(n.total_failed, Some(1));
        assert!(n.message.contains("Step vms failed: connection reset"));
    }

    #[test]
    fn status_change_level_follows_new_status() {
        let change = |new_status| SyncEvent::StatusChanged {
            platform_id: 1,
            platform_name: "vc01".into(),
            old_status: PlatformStatus::Connected,
            new_status,
        };
        assert_eq!(
            NotificationRouter::render(&change(PlatformStatus::Error)).level,
            NotificationLevel::Danger
        );
        assert_eq!(
            NotificationRouter::render(&change(PlatformStatus::Connected)).level,
            NotificationLevel::Success
        );
        let n = NotificationRouter::render(&change(PlatformStatus::Maintenance));
        assert_eq!(n.level, NotificationLevel::Warning);
        assert_eq!(n.message, "Connected -> Maintenance");
    }

    #[test]
    fn failed_sync_is_danger_and_serializes_without_totals() {
        let n = NotificationRouter::render(&SyncEvent::SyncFailed {
            platform_id: 2,
            platform_name: "vc02".into(),
            error: "platform lookup failed".into(),
        });
        assert_eq!(n.level, NotificationLevel::Danger);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["level"], "danger");
        assert_eq!(json["event_type"], "platform.sync_failed");
        assert!(json.get("total_synced").is_none());
    }

    #[tokio::test]
    async fn run_exits_when_bus_is_dropped() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let handle = tokio::spawn(NotificationRouter::default().run(rx));

        bus.publish(completed());
        drop(bus);

        handle.await.unwrap();
    }
}
