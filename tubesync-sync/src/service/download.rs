//! Download flow
//!
//! Builds direct links and starts server-side saves, recording every outcome
//! in the recent cache. Each URL has at most one save monitor at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tubesync_client::ClientError;
use tubesync_core::domain::progress::SaveProgressRecord;
use tubesync_core::domain::recent::SaveStatus;
use tubesync_core::domain::video::is_placeholder_title;
use tubesync_core::dto::media::{DirectLinkResponse, MediaKind};

use crate::lock;
use crate::monitor::{SaveProgressMonitor, SaveTarget};
use crate::progress::SaveProgressStore;
use crate::recent::RecentCache;
use crate::repository::BackendRepository;

const DEFAULT_BUSY_MESSAGE: &str = "Another save is already running on the server";
const TRACKED_MESSAGE: &str = "A save for this video is already being tracked";

/// Outcome of a server-side save request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The server already holds a confirmed copy
    Saved { public_url: String },
    /// A save started and a monitor is tracking it
    Started,
    /// Another save is running; nothing was started
    Busy { message: String },
}

/// Result of building a direct link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkOutcome {
    pub response: DirectLinkResponse,
    /// Set when the backend fell back to a server-side save
    pub save: Option<SaveOutcome>,
}

#[derive(Default)]
struct MonitorSlots {
    keys: HashSet<String>,
    handles: Vec<JoinHandle<()>>,
}

pub struct DownloadService {
    api: Arc<dyn BackendRepository>,
    recent: Arc<RecentCache>,
    progress: Arc<SaveProgressStore>,
    monitor: Arc<SaveProgressMonitor>,
    slots: Arc<Mutex<MonitorSlots>>,
}

impl DownloadService {
    pub fn new(
        api: Arc<dyn BackendRepository>,
        recent: Arc<RecentCache>,
        progress: Arc<SaveProgressStore>,
        monitor: Arc<SaveProgressMonitor>,
    ) -> Self {
        Self {
            api,
            recent,
            progress,
            monitor,
            slots: Arc::new(Mutex::new(MonitorSlots::default())),
        }
    }

    /// Builds a direct media link for `url`
    ///
    /// The link is recorded on the recent entry. When the backend reports a
    /// server-side save instead, the entry gets the matching save status and
    /// a monitor is started for a save in progress.
    pub async fn build_link(&self, url: &str, kind: MediaKind) -> Result<LinkOutcome, ClientError> {
        let response = self.api.build_link(url, kind).await?;
        let now = Utc::now();

        self.recent.update(url, now, |entry| {
            let link = response.download_url.trim();
            if !link.is_empty() {
                match kind {
                    MediaKind::Video => entry.links.video = Some(link.to_string()),
                    MediaKind::Audio => entry.links.audio = Some(link.to_string()),
                }
            }
            if !response.video_id.trim().is_empty() {
                entry.video_id = response.video_id.trim().to_string();
            }
            if !is_placeholder_title(&response.title) {
                entry.title = response.title.trim().to_string();
            }
        });

        let public_url = response.public_url.trim();
        let save = if !public_url.is_empty() {
            Some(self.record_saved(url, public_url))
        } else if response.save_busy {
            Some(self.record_busy(url, &response.save_busy_message))
        } else if response.save_started {
            Some(self.record_started(url, &response.video_id))
        } else {
            None
        };

        debug!(url, kind = kind.as_str(), fallback = save.is_some(), "Direct link built");
        Ok(LinkOutcome { response, save })
    }

    /// Starts a server-side save of `url`
    ///
    /// A URL whose save is already being monitored is answered as busy
    /// without calling the backend.
    pub async fn start_save(&self, url: &str) -> Result<SaveOutcome, ClientError> {
        let key = SaveTarget::new(url, None).url;
        if self.is_monitoring(&key) {
            return Ok(SaveOutcome::Busy {
                message: TRACKED_MESSAGE.to_string(),
            });
        }

        let response = match self.api.start_save(url).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, "Server save failed to start: {}", e);
                let message = e.user_message();
                self.progress.set(&key, SaveProgressRecord::error(0.0, message.clone()));
                self.recent.mark_status(url, SaveStatus::Error, &message, Utc::now());
                return Err(e);
            }
        };

        let public_url = response.public_url.trim();
        let outcome = if !public_url.is_empty() {
            self.record_saved(url, public_url)
        } else if response.is_busy() {
            self.record_busy(url, &response.busy_message)
        } else {
            self.record_started(url, &response.video_id)
        };
        Ok(outcome)
    }

    fn record_saved(&self, url: &str, public_url: &str) -> SaveOutcome {
        info!(url, "Video already saved on server");
        self.progress
            .set(url.trim(), SaveProgressRecord::done("Saved on server"));
        self.recent.mark_saved(url, public_url, None, Utc::now());
        SaveOutcome::Saved {
            public_url: public_url.to_string(),
        }
    }

    fn record_busy(&self, url: &str, message: &str) -> SaveOutcome {
        let message = match message.trim() {
            "" => DEFAULT_BUSY_MESSAGE.to_string(),
            m => m.to_string(),
        };
        info!(url, "Server save busy: {}", message);
        self.recent.mark_status(url, SaveStatus::Busy, &message, Utc::now());
        SaveOutcome::Busy { message }
    }

    fn record_started(&self, url: &str, video_id: &str) -> SaveOutcome {
        self.recent.mark_status(url, SaveStatus::Started, "", Utc::now());
        let target = SaveTarget::new(url, Some(video_id));
        if !self.spawn_monitor(target) {
            debug!(url, "Save monitor already running");
        }
        SaveOutcome::Started
    }

    /// Starts a monitor for `target` unless one already runs for its URL
    ///
    /// # Returns
    /// `true` if a new monitor was started
    pub fn spawn_monitor(&self, target: SaveTarget) -> bool {
        let key = target.url.clone();
        if !lock(&self.slots).keys.insert(key.clone()) {
            return false;
        }

        let monitor = Arc::clone(&self.monitor);
        let slots = Arc::clone(&self.slots);
        let handle = tokio::spawn(async move {
            let outcome = monitor.run(target).await;
            debug!(url = %key, ?outcome, "Save monitor finished");
            lock(&slots).keys.remove(&key);
        });

        let mut slots = lock(&self.slots);
        slots.handles.retain(|h| !h.is_finished());
        slots.handles.push(handle);
        true
    }

    pub fn is_monitoring(&self, url: &str) -> bool {
        lock(&self.slots).keys.contains(url.trim())
    }

    /// Waits for every running monitor to reach its terminal outcome
    pub async fn wait_for_monitors(&self) {
        loop {
            let handles = std::mem::take(&mut lock(&self.slots).handles);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!("Save monitor task failed: {}", e);
                    }
                }
            }
        }
    }

    /// Aborts every running monitor
    pub fn shutdown(&self) {
        let mut slots = lock(&self.slots);
        for handle in slots.handles.drain(..) {
            handle.abort();
        }
        slots.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::monitor::MonitorConfig;
    use crate::store::{KeyValueStore, MemoryStore};
    use crate::testing::{FakeBackend, saved_video};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tubesync_core::domain::progress::ProgressStatus;
    use tubesync_core::dto::media::SaveResponse;

    const URL: &str = "https://www.youtube.com/watch?v=abc123";

    struct Fixture {
        api: Arc<FakeBackend>,
        recent: Arc<RecentCache>,
        progress: Arc<SaveProgressStore>,
        service: DownloadService,
    }

    fn fixture() -> Fixture {
        let api = FakeBackend::new();
        let events = EventBus::new();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recent = Arc::new(RecentCache::new(store, events.clone(), 10, Duration::from_secs(1200)));
        let progress = Arc::new(SaveProgressStore::new(events));
        let repo = Arc::clone(&api) as Arc<dyn BackendRepository>;
        let monitor = Arc::new(SaveProgressMonitor::new(
            Arc::clone(&repo),
            Arc::clone(&recent),
            Arc::clone(&progress),
            MonitorConfig {
                max_iterations: 10,
                delay: Duration::from_secs(4),
            },
        ));
        let service = DownloadService::new(repo, Arc::clone(&recent), Arc::clone(&progress), monitor);
        Fixture {
            api,
            recent,
            progress,
            service,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_link_with_started_save_is_monitored_until_saved() {
        let f = fixture();
        *f.api.link_response.lock().unwrap() = DirectLinkResponse {
            video_id: "abc123".into(),
            save_started: true,
            ..DirectLinkResponse::default()
        };
        f.api.script_videos(vec![
            vec![],
            vec![saved_video("abc123", "https://files.example/abc123.mp4")],
        ]);

        let outcome = f.service.build_link(URL, MediaKind::Video).await.unwrap();

        assert_eq!(outcome.save, Some(SaveOutcome::Started));
        assert_eq!(f.recent.find(URL).unwrap().save_status, SaveStatus::Started);
        assert!(f.service.is_monitoring(URL));

        f.service.wait_for_monitors().await;

        let entry = f.recent.find(URL).unwrap();
        assert_eq!(entry.save_status, SaveStatus::Saved);
        assert_eq!(entry.saved_video_url, "https://files.example/abc123.mp4");
        assert_eq!(f.progress.get(URL).unwrap().status, ProgressStatus::Done);
        assert!(!f.service.is_monitoring(URL));
    }

    #[tokio::test]
    async fn test_build_link_records_direct_link() {
        let f = fixture();
        *f.api.link_response.lock().unwrap() = DirectLinkResponse {
            video_id: "abc123".into(),
            title: "Dialing in espresso".into(),
            download_url: "https://cdn.example/a.m4a".into(),
            ..DirectLinkResponse::default()
        };

        let outcome = f.service.build_link(URL, MediaKind::Audio).await.unwrap();

        assert_eq!(outcome.save, None);
        let entry = f.recent.find(URL).unwrap();
        assert_eq!(entry.links.audio.as_deref(), Some("https://cdn.example/a.m4a"));
        assert_eq!(entry.links.video, None);
        assert_eq!(entry.title, "Dialing in espresso");
        assert_eq!(entry.save_status, SaveStatus::None);
    }

    #[tokio::test]
    async fn test_build_link_with_public_url_is_saved_immediately() {
        let f = fixture();
        *f.api.link_response.lock().unwrap() = DirectLinkResponse {
            video_id: "abc123".into(),
            save_started: true,
            public_url: "https://files.example/abc123.mp4".into(),
            ..DirectLinkResponse::default()
        };

        let outcome = f.service.build_link(URL, MediaKind::Video).await.unwrap();

        assert_eq!(
            outcome.save,
            Some(SaveOutcome::Saved {
                public_url: "https://files.example/abc123.mp4".into()
            })
        );
        assert!(!f.service.is_monitoring(URL));
        assert_eq!(f.recent.find(URL).unwrap().save_status, SaveStatus::Saved);
    }

    #[tokio::test]
    async fn test_busy_save_is_not_an_error() {
        let f = fixture();
        *f.api.save_response.lock().unwrap() = SaveResponse {
            status: "busy".into(),
            busy_message: "Queue is full".into(),
            ..SaveResponse::default()
        };

        let outcome = f.service.start_save(URL).await.unwrap();

        assert_eq!(
            outcome,
            SaveOutcome::Busy {
                message: "Queue is full".into()
            }
        );
        let entry = f.recent.find(URL).unwrap();
        assert_eq!(entry.save_status, SaveStatus::Busy);
        assert!(!f.service.is_monitoring(URL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_save_for_monitored_url_is_busy() {
        let f = fixture();
        *f.api.save_response.lock().unwrap() = SaveResponse {
            status: "started".into(),
            video_id: "abc123".into(),
            ..SaveResponse::default()
        };

        assert_eq!(f.service.start_save(URL).await.unwrap(), SaveOutcome::Started);
        let second = f.service.start_save(URL).await.unwrap();

        assert!(matches!(second, SaveOutcome::Busy { .. }));
        assert_eq!(f.api.start_save_calls.load(Ordering::SeqCst), 1);
        f.service.shutdown();
        assert!(!f.service.is_monitoring(URL));
    }

    #[tokio::test]
    async fn test_failed_save_marks_error() {
        let f = fixture();
        *f.api.save_error.lock().unwrap() = Some("provider refused".into());

        let err = f.service.start_save(URL).await.unwrap_err();

        assert!(err.to_string().contains("provider refused"));
        assert_eq!(f.recent.find(URL).unwrap().save_status, SaveStatus::Error);
        assert_eq!(f.progress.get(URL).unwrap().status, ProgressStatus::Error);
    }
}
