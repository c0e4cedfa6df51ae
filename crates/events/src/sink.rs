//! The seam through which the orchestrator emits events.

use std::sync::{Arc, Mutex};

use crate::bus::{EventBus, SyncEvent};

/// Receives sync lifecycle events. Emission never fails the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

impl EventSink for EventBus {
    fn emit(&self, event: SyncEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            platform_id = event.platform_id(),
            "Publishing sync event",
        );
        self.publish(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: SyncEvent) {
        (**self).emit(event);
    }
}

/// Sink that keeps every event in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use virtsync_core::status::PlatformStatus;

    use super::*;

    #[test]
    fn recording_sink_keeps_order_across_clones() {
        let sink = RecordingSink::new();
        let shared: Arc<dyn EventSink> = Arc::new(sink.clone());

        shared.emit(SyncEvent::StatusChanged {
            platform_id: 1,
            platform_name: "vc01".into(),
            old_status: PlatformStatus::Disconnected,
            new_status: PlatformStatus::Connected,
        });
        shared.emit(SyncEvent::SyncFailed {
            platform_id: 1,
            platform_name: "vc01".into(),
            error: "timeout".into(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "platform.status_changed");
        assert_eq!(events[1].event_type(), "platform.sync_failed");

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn bus_sink_publishes_to_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::SyncFailed {
            platform_id: 9,
            platform_name: "esx09".into(),
            error: "auth".into(),
        });
        assert_eq!(rx.recv().await.unwrap().platform_id(), 9);
    }
}
