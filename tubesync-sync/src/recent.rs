//! Recent downloads cache
//!
//! Two views of the same downloads are reconciled here:
//! - the locally persisted list of [`RecentDownloadEntry`] (capped)
//! - entries synthesized from the server's saved videos
//!
//! Local entries are overlaid onto server entries by dedupe key. A confirmed
//! saved URL always wins; otherwise local status and links win when present.
//! Only the local list is persisted and capped; the read view also shows
//! server entries beyond the cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use tubesync_core::domain::recent::{MediaLinks, RecentDownloadEntry, SaveStatus};
use tubesync_core::domain::video::is_placeholder_title;
use tubesync_core::dto::video::VideoSummary;

use crate::events::{EventBus, SyncEvent};
use crate::lock;
use crate::store::{KeyValueStore, load_json, save_json};

/// Current storage key of the recent list
pub const RECENT_KEY: &str = "recent_downloads_v2";

/// Storage key of the unversioned list written by older clients
pub const LEGACY_RECENT_KEY: &str = "recent_downloads";

const RECENT_VERSION: u32 = 2;

const STALE_MESSAGE: &str = "Save was not confirmed in time";

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecent {
    version: u32,
    #[serde(default)]
    items: Vec<Value>,
}

/// Entry shape of the legacy list
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyEntry {
    url: String,
    #[serde(alias = "videoId")]
    video_id: String,
    title: String,
    #[serde(alias = "videoLink")]
    video_link: Option<String>,
    #[serde(alias = "audioLink")]
    audio_link: Option<String>,
    #[serde(alias = "savedVideoUrl")]
    saved_video_url: String,
    #[serde(alias = "saveStatus")]
    save_status: String,
    /// Milliseconds since the epoch
    ts: i64,
}

impl LegacyEntry {
    fn migrate(self) -> Option<RecentDownloadEntry> {
        let at = DateTime::<Utc>::from_timestamp_millis(self.ts).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        RecentDownloadEntry {
            url: self.url,
            video_id: self.video_id,
            title: self.title,
            links: MediaLinks {
                video: self.video_link,
                audio: self.audio_link,
            },
            saved_video_url: self.saved_video_url,
            save_status: SaveStatus::parse(&self.save_status),
            created_at: at,
            updated_at: at,
            ..RecentDownloadEntry::default()
        }
        .normalize()
    }
}

/// One row of the reconciled read view
#[derive(Debug, Clone, PartialEq)]
pub struct RecentItem {
    pub entry: RecentDownloadEntry,
    /// Status after applying the staleness rule
    pub status: SaveStatus,
}

/// Locally persisted recent downloads reconciled with server truth
pub struct RecentCache {
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    cap: usize,
    stale_after: Duration,
    server: Mutex<Vec<VideoSummary>>,
    /// Held across every load, modify and persist of the local list
    writes: Mutex<()>,
}

impl RecentCache {
    /// Creates a cache over a key/value store
    ///
    /// # Arguments
    /// * `cap` - Maximum number of persisted local entries
    /// * `stale_after` - Pending saves idle for longer read as failed
    pub fn new(store: Arc<dyn KeyValueStore>, events: EventBus, cap: usize, stale_after: Duration) -> Self {
        Self {
            store,
            events,
            cap,
            stale_after,
            server: Mutex::new(Vec::new()),
            writes: Mutex::new(()),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    // =============================================================================
    // Local list
    // =============================================================================

    /// Loads the persisted local list
    ///
    /// Fails open: unreadable or corrupt storage yields an empty list. The
    /// legacy list is migrated on first load.
    pub fn load(&self) -> Vec<RecentDownloadEntry> {
        let _writes = lock(&self.writes);
        self.load_entries()
    }

    fn load_entries(&self) -> Vec<RecentDownloadEntry> {
        if let Some(stored) = load_json::<StoredRecent>(self.store.as_ref(), RECENT_KEY) {
            if stored.version != RECENT_VERSION {
                warn!(version = stored.version, "Ignoring recent list with unknown version");
                return Vec::new();
            }
            return stored.items.into_iter().filter_map(decode_entry).collect();
        }

        self.migrate_legacy()
    }

    fn migrate_legacy(&self) -> Vec<RecentDownloadEntry> {
        let Some(items) = load_json::<Vec<Value>>(self.store.as_ref(), LEGACY_RECENT_KEY) else {
            return Vec::new();
        };

        let entries: Vec<RecentDownloadEntry> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<LegacyEntry>(item).ok())
            .filter_map(LegacyEntry::migrate)
            .collect();
        debug!(count = entries.len(), "Migrating legacy recent list");

        let entries = self.write(entries, Utc::now());
        if let Err(e) = self.store.remove(LEGACY_RECENT_KEY) {
            warn!("Failed to remove legacy recent list: {}", e);
        }
        entries
    }

    /// Normalizes, dedupes, sorts, caps and persists the local list
    ///
    /// Pending saves past the staleness threshold are persisted as failed.
    /// Write failures are logged and swallowed.
    ///
    /// # Returns
    /// The list as persisted
    pub fn persist(&self, entries: Vec<RecentDownloadEntry>, now: DateTime<Utc>) -> Vec<RecentDownloadEntry> {
        let _writes = lock(&self.writes);
        self.persist_entries(entries, now)
    }

    fn persist_entries(&self, entries: Vec<RecentDownloadEntry>, now: DateTime<Utc>) -> Vec<RecentDownloadEntry> {
        let current = self.load_entries();
        let prepared = self.prepare(entries, now);
        if prepared == current {
            return prepared;
        }
        self.store_list(&prepared);
        prepared
    }

    fn write(&self, entries: Vec<RecentDownloadEntry>, now: DateTime<Utc>) -> Vec<RecentDownloadEntry> {
        let prepared = self.prepare(entries, now);
        self.store_list(&prepared);
        prepared
    }

    fn prepare(&self, entries: Vec<RecentDownloadEntry>, now: DateTime<Utc>) -> Vec<RecentDownloadEntry> {
        let mut by_key: HashMap<String, RecentDownloadEntry> = HashMap::new();
        for mut entry in entries.into_iter().filter_map(RecentDownloadEntry::normalize) {
            if entry.is_stale(now, self.stale_after) {
                entry.save_status = SaveStatus::Error;
                entry.save_message = STALE_MESSAGE.to_string();
            }

            let key = entry.dedupe_key();
            let merged = match by_key.remove(&key) {
                Some(existing) if existing.updated_at > entry.updated_at => merge_entries(existing, &entry),
                Some(existing) => merge_entries(entry, &existing),
                None => entry,
            };
            by_key.insert(key, merged);
        }

        let mut list: Vec<RecentDownloadEntry> = by_key.into_values().collect();
        sort_newest_first(&mut list);
        list.truncate(self.cap);
        list
    }

    fn store_list(&self, entries: &[RecentDownloadEntry]) {
        let items = entries
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .collect();
        save_json(
            self.store.as_ref(),
            RECENT_KEY,
            &StoredRecent {
                version: RECENT_VERSION,
                items,
            },
        );
        self.events.emit(SyncEvent::RecentChanged);
    }

    /// Applies `apply` to the entry of `url`, creating it if needed
    ///
    /// `updated_at` is bumped to `now` and the list is persisted.
    ///
    /// # Returns
    /// The entry after the update, or `None` for a blank URL
    pub fn update<F>(&self, url: &str, now: DateTime<Utc>, apply: F) -> Option<RecentDownloadEntry>
    where
        F: FnOnce(&mut RecentDownloadEntry),
    {
        let _writes = lock(&self.writes);
        self.update_entry(url, now, apply)
    }

    fn update_entry<F>(&self, url: &str, now: DateTime<Utc>, apply: F) -> Option<RecentDownloadEntry>
    where
        F: FnOnce(&mut RecentDownloadEntry),
    {
        let fresh = RecentDownloadEntry::new(url, now)?;
        let key = fresh.dedupe_key();

        let mut entries = self.load_entries();
        let mut entry = match entries.iter().position(|e| e.dedupe_key() == key) {
            Some(index) => entries.remove(index),
            None => fresh,
        };

        apply(&mut entry);
        entry.updated_at = now;
        let entry = entry.normalize()?;

        entries.push(entry.clone());
        self.persist_entries(entries, now);
        Some(entry)
    }

    /// Records a save status for `url`
    ///
    /// A saved entry only accepts another `saved`; late pending or error
    /// updates never downgrade a confirmed save.
    pub fn mark_status(
        &self,
        url: &str,
        status: SaveStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Option<RecentDownloadEntry> {
        let _writes = lock(&self.writes);
        if let Some(existing) = self.find_entry(url) {
            if existing.save_status == SaveStatus::Saved && status != SaveStatus::Saved {
                debug!(url, status = status.as_str(), "Ignoring status update of a saved entry");
                return Some(existing);
            }
        }

        self.update_entry(url, now, |entry| {
            entry.save_status = status;
            entry.save_message = message.to_string();
        })
    }

    /// Records a confirmed server save
    pub fn mark_saved(
        &self,
        url: &str,
        saved_video_url: &str,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<RecentDownloadEntry> {
        self.update(url, now, |entry| {
            entry.saved_video_url = saved_video_url.to_string();
            entry.save_status = SaveStatus::Saved;
            entry.save_message.clear();
            if let Some(title) = title.filter(|t| !is_placeholder_title(t)) {
                entry.title = title.to_string();
            }
        })
    }

    /// Finds the local entry of `url` by dedupe key
    pub fn find(&self, url: &str) -> Option<RecentDownloadEntry> {
        let _writes = lock(&self.writes);
        self.find_entry(url)
    }

    fn find_entry(&self, url: &str) -> Option<RecentDownloadEntry> {
        let key = RecentDownloadEntry::new(url, Utc::now())?.dedupe_key();
        self.load_entries().into_iter().find(|e| e.dedupe_key() == key)
    }

    // =============================================================================
    // Reconciliation
    // =============================================================================

    /// Reconciles the local list with a fresh server video list
    ///
    /// Local entries that have a server counterpart are persisted with the
    /// merged fields.
    ///
    /// # Returns
    /// The reconciled read view
    pub fn reconcile(&self, videos: Vec<VideoSummary>, now: DateTime<Utc>) -> Vec<RecentItem> {
        {
            let _writes = lock(&self.writes);
            *lock(&self.server) = videos;
            let (_, local_backed) = self.merge(self.load_entries());
            self.persist_entries(local_backed, now);
        }

        self.read_view(now)
    }

    /// Reconciled view of local entries and the last known server videos
    ///
    /// Sorted newest first and not capped. Statuses have the staleness rule
    /// applied without touching the stored records.
    pub fn read_view(&self, now: DateTime<Utc>) -> Vec<RecentItem> {
        let (merged, _) = self.merge(self.load());
        merged
            .into_iter()
            .map(|entry| {
                let status = entry.effective_status(now, self.stale_after);
                RecentItem { entry, status }
            })
            .collect()
    }

    /// Overlays local entries onto server entries
    ///
    /// # Returns
    /// The full merged view, and the merged entries that have a local record
    fn merge(&self, local: Vec<RecentDownloadEntry>) -> (Vec<RecentDownloadEntry>, Vec<RecentDownloadEntry>) {
        let mut by_key: HashMap<String, RecentDownloadEntry> = HashMap::new();
        for entry in lock(&self.server).iter().filter_map(server_entry) {
            by_key.entry(entry.dedupe_key()).or_insert(entry);
        }

        let mut local_keys = Vec::with_capacity(local.len());
        for entry in local {
            let key = entry.dedupe_key();
            let merged = match by_key.remove(&key) {
                Some(server) => merge_entries(entry, &server),
                None => entry,
            };
            by_key.insert(key.clone(), merged);
            local_keys.push(key);
        }

        let local_backed: Vec<RecentDownloadEntry> = local_keys
            .iter()
            .filter_map(|key| by_key.get(key).cloned())
            .collect();

        let mut all: Vec<RecentDownloadEntry> = by_key.into_values().collect();
        sort_newest_first(&mut all);
        (all, local_backed)
    }
}

fn decode_entry(item: Value) -> Option<RecentDownloadEntry> {
    match serde_json::from_value::<RecentDownloadEntry>(item) {
        Ok(entry) => entry.normalize(),
        Err(e) => {
            debug!("Skipping unreadable recent entry: {}", e);
            None
        }
    }
}

fn sort_newest_first(entries: &mut [RecentDownloadEntry]) {
    entries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.url.cmp(&b.url))
    });
}

/// Synthesizes an entry from a server-confirmed video
///
/// Only videos with a public saved URL count as confirmed saves.
fn server_entry(video: &VideoSummary) -> Option<RecentDownloadEntry> {
    let public_url = video.public_url.trim();
    if public_url.is_empty() {
        return None;
    }

    let url = [video.source_url.trim(), video.youtube_url.trim()]
        .into_iter()
        .find(|u| !u.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let id = video.video_id.trim();
            (!id.is_empty()).then(|| format!("https://www.youtube.com/watch?v={id}"))
        })?;

    let at = DateTime::<Utc>::from_timestamp(video.last_activity_epoch(), 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    RecentDownloadEntry {
        url,
        video_id: video.video_id.clone(),
        title: video.title.clone(),
        thumbnail_url: video.thumbnail_url.clone(),
        saved_video_url: public_url.to_string(),
        save_status: SaveStatus::Saved,
        created_at: at,
        updated_at: at,
        ..RecentDownloadEntry::default()
    }
    .normalize()
}

/// Merges two records of the same dedupe key, `primary` taking precedence
fn merge_entries(primary: RecentDownloadEntry, other: &RecentDownloadEntry) -> RecentDownloadEntry {
    let mut merged = primary;

    if merged.saved_video_url.is_empty() {
        merged.saved_video_url = other.saved_video_url.clone();
    }
    if merged.save_status == SaveStatus::None {
        merged.save_status = other.save_status;
        merged.save_message = other.save_message.clone();
    }
    if merged.links.is_empty() {
        merged.links = other.links.clone();
    }
    if merged.has_placeholder_title() && (!other.has_placeholder_title() || merged.title.is_empty()) {
        merged.title = other.title.clone();
    }
    if merged.thumbnail_url.is_empty() {
        merged.thumbnail_url = other.thumbnail_url.clone();
    }
    if merged.video_id.is_empty() {
        merged.video_id = other.video_id.clone();
    }
    merged.created_at = merged.created_at.min(other.created_at);
    merged.updated_at = merged.updated_at.max(other.updated_at);

    // A confirmed saved URL forces the saved status
    merged.clone().normalize().unwrap_or(merged)
}
