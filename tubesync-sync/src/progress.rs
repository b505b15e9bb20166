//! Transient save progress
//!
//! Progress records are keyed by source URL and never persisted. Writes are
//! last-write-wins per key; every write is announced on the event bus.

use std::collections::HashMap;
use std::sync::Mutex;

use tubesync_core::domain::progress::SaveProgressRecord;

use crate::events::{EventBus, SyncEvent};
use crate::lock;

pub struct SaveProgressStore {
    records: Mutex<HashMap<String, SaveProgressRecord>>,
    events: EventBus,
}

impl SaveProgressStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Stores the record for `key`, replacing any previous one
    pub fn set(&self, key: &str, record: SaveProgressRecord) {
        lock(&self.records).insert(key.to_string(), record.clone());
        self.events.emit(SyncEvent::SaveProgress {
            key: key.to_string(),
            record,
        });
    }

    pub fn get(&self, key: &str) -> Option<SaveProgressRecord> {
        lock(&self.records).get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tubesync_core::domain::progress::ProgressStatus;

    #[test]
    fn test_percent_always_clamped() {
        let store = SaveProgressStore::new(EventBus::new());
        for input in [-20.0, 0.0, 42.5, 100.0, 180.0, f64::NAN, f64::INFINITY] {
            store.set("u", SaveProgressRecord::running(input, "Saving"));
            let percent = store.get("u").unwrap().percent();
            assert!((0.0..=100.0).contains(&percent), "{input} stored as {percent}");
        }
    }

    #[test]
    fn test_last_write_wins() {
        let store = SaveProgressStore::new(EventBus::new());
        store.set("u", SaveProgressRecord::running(30.0, "Saving"));
        store.set("u", SaveProgressRecord::done("Saved"));

        let record = store.get("u").unwrap();
        assert_eq!(record.status, ProgressStatus::Done);
        assert_eq!(record.percent(), 100.0);
    }

    #[tokio::test]
    async fn test_writes_are_announced() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let store = SaveProgressStore::new(events);

        store.set("u", SaveProgressRecord::error(10.0, "Save failed"));

        match rx.recv().await.unwrap() {
            SyncEvent::SaveProgress { key, record } => {
                assert_eq!(key, "u");
                assert_eq!(record.status, ProgressStatus::Error);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
