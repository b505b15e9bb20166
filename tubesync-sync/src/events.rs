//! Change notifications
//!
//! Components emit a [`SyncEvent`] after every state change. Renderers
//! subscribe and re-read whatever they display.

use tokio::sync::broadcast;
use tubesync_core::domain::job::JobKindTag;
use tubesync_core::domain::progress::SaveProgressRecord;

const EVENT_CAPACITY: usize = 256;

/// State of the live-update transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connecting,
    /// Push channel connected
    Live,
    /// Push channel dropped, one reconnect attempt pending
    Degraded,
    /// Pull loop active
    Polling,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    JobsChanged {
        kind: JobKindTag,
    },
    SelectionChanged {
        kind: JobKindTag,
        job_id: Option<String>,
    },
    RecentChanged,
    SaveProgress {
        key: String,
        record: SaveProgressRecord,
    },
    GateChanged {
        resource_id: String,
    },
    Transport(TransportStatus),
}

/// Cloneable fan-out of [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Emits an event; having no subscribers is fine
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
