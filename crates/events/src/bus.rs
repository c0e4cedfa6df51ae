//! In-process event bus backed by a `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;
use virtsync_core::report::SyncReport;
use virtsync_core::status::PlatformStatus;
use virtsync_core::types::DbId;

/// A sync lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A full sync ran to completion. Individual steps may still have failed;
    /// see the report.
    SyncCompleted {
        platform_id: DbId,
        platform_name: String,
        summary: SyncReport,
    },
    /// A full sync was aborted.
    SyncFailed {
        platform_id: DbId,
        platform_name: String,
        error: String,
    },
    /// The platform's connection status changed.
    StatusChanged {
        platform_id: DbId,
        platform_name: String,
        old_status: PlatformStatus,
        new_status: PlatformStatus,
    },
}

impl SyncEvent {
    /// Dot-separated event name, e.g. `"platform.sync_completed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SyncCompleted { .. } => "platform.sync_completed",
            Self::SyncFailed { .. } => "platform.sync_failed",
            Self::StatusChanged { .. } => "platform.status_changed",
        }
    }

    pub fn platform_id(&self) -> DbId {
        match self {
            Self::SyncCompleted { platform_id, .. }
            | Self::SyncFailed { platform_id, .. }
            | Self::StatusChanged { platform_id, .. } => *platform_id,
        }
    }

    pub fn platform_name(&self) -> &str {
        match self {
            Self::SyncCompleted { platform_name, .. }
            | Self::SyncFailed { platform_name, .. }
            | Self::StatusChanged { platform_name, .. } => platform_name,
        }
    }
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Any number of subscribers independently receive every published
/// [`SyncEvent`]. Share it as `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Without subscribers the
    /// event is dropped.
    pub fn publish(&self, event: SyncEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
