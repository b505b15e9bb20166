//! Recent download entries
//!
//! One entry per source URL the user asked a download link or a server save
//! for. Entries are persisted locally and reconciled against the server's
//! video list by the sync layer.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::video::{extract_video_id, is_placeholder_title};

/// Save state of a recent download as known to this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum SaveStatus {
    /// No server save was requested
    #[default]
    #[serde(rename = "")]
    None,
    Started,
    Running,
    Saved,
    Error,
    /// Another save was already running on the server
    Busy,
}

impl From<String> for SaveStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl SaveStatus {
    /// Parses the status strings used by the backend and older cache records
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "started" => Self::Started,
            "running" => Self::Running,
            "saved" | "already_saved" | "done" => Self::Saved,
            "error" | "failed" => Self::Error,
            "busy" => Self::Busy,
            _ => Self::None,
        }
    }

    /// Started and running saves are waiting for server confirmation
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Started | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Started => "started",
            Self::Running => "running",
            Self::Saved => "saved",
            Self::Error => "error",
            Self::Busy => "busy",
        }
    }
}

/// Ephemeral provider-issued media links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaLinks {
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl MediaLinks {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }
}

/// A client-remembered download or save attempt for one source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentDownloadEntry {
    pub url: String,
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: String,
    pub links: MediaLinks,
    /// Durable, server-confirmed saved file URL
    pub saved_video_url: String,
    pub save_status: SaveStatus,
    pub save_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RecentDownloadEntry {
    fn default() -> Self {
        Self {
            url: String::new(),
            video_id: String::new(),
            title: String::new(),
            thumbnail_url: String::new(),
            links: MediaLinks::default(),
            saved_video_url: String::new(),
            save_status: SaveStatus::None,
            save_message: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl RecentDownloadEntry {
    /// Creates a fresh entry for `url`, or `None` if the URL is blank
    pub fn new(url: &str, now: DateTime<Utc>) -> Option<Self> {
        Self {
            url: url.to_string(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
        .normalize()
    }

    /// Enforces the entry invariants
    ///
    /// - the URL is required
    /// - the video id is derived from the URL when not given
    /// - a confirmed saved URL forces the `saved` status
    pub fn normalize(mut self) -> Option<Self> {
        self.url = self.url.trim().to_string();
        if self.url.is_empty() {
            return None;
        }
        self.video_id = self.video_id.trim().to_string();
        if self.video_id.is_empty() {
            self.video_id = extract_video_id(&self.url).unwrap_or_default();
        }
        self.title = self.title.trim().to_string();
        self.saved_video_url = self.saved_video_url.trim().to_string();
        if !self.saved_video_url.is_empty() {
            self.save_status = SaveStatus::Saved;
        }
        self.links.video = self.links.video.take().filter(|l| !l.trim().is_empty());
        self.links.audio = self.links.audio.take().filter(|l| !l.trim().is_empty());
        if self.created_at > self.updated_at {
            self.created_at = self.updated_at;
        }
        Some(self)
    }

    /// Identity used to merge records of the same video
    ///
    /// The video id when resolvable, otherwise the source URL.
    pub fn dedupe_key(&self) -> String {
        if !self.video_id.is_empty() {
            return self.video_id.clone();
        }
        extract_video_id(&self.url).unwrap_or_else(|| self.url.clone())
    }

    /// Most recent activity timestamp
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }

    /// Returns `true` if a pending save has had no activity for longer than `stale_after`
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        let limit = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);
        self.save_status.is_pending() && now.signed_duration_since(self.last_activity()) > limit
    }

    /// Status used for rendering and gating decisions
    ///
    /// A pending save with no activity for longer than `stale_after` reads as
    /// `error`. The stored status is left untouched.
    pub fn effective_status(&self, now: DateTime<Utc>, stale_after: Duration) -> SaveStatus {
        if self.is_stale(now, stale_after) {
            SaveStatus::Error
        } else {
            self.save_status
        }
    }

    /// Title for display, falling back to the video id and then the URL
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.video_id.is_empty() {
            &self.video_id
        } else {
            &self.url
        }
    }

    /// Returns `true` if the title is missing or just a video id
    pub fn has_placeholder_title(&self) -> bool {
        is_placeholder_title(&self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(status: SaveStatus, minutes_ago: i64, now: DateTime<Utc>) -> RecentDownloadEntry {
        let mut entry = RecentDownloadEntry::new("https://youtu.be/abc123XYZ", now).unwrap();
        entry.save_status = status;
        entry.created_at = now - TimeDelta::minutes(minutes_ago);
        entry.updated_at = now - TimeDelta::minutes(minutes_ago);
        entry
    }

    #[test]
    fn test_new_derives_video_id() {
        let entry = RecentDownloadEntry::new(" https://www.youtube.com/watch?v=abc123XYZ ", Utc::now())
            .unwrap();
        assert_eq!(entry.url, "https://www.youtube.com/watch?v=abc123XYZ");
        assert_eq!(entry.video_id, "abc123XYZ");
        assert_eq!(entry.dedupe_key(), "abc123XYZ");
    }

    #[test]
    fn test_blank_url_is_rejected() {
        assert!(RecentDownloadEntry::new("   ", Utc::now()).is_none());
    }

    #[test]
    fn test_dedupe_key_falls_back_to_url() {
        let entry = RecentDownloadEntry::new("https://example.com/clip.mp4", Utc::now()).unwrap();
        assert_eq!(entry.dedupe_key(), "https://example.com/clip.mp4");
    }

    #[test]
    fn test_saved_url_forces_saved_status() {
        let entry = RecentDownloadEntry {
            url: "https://youtu.be/abc123XYZ".into(),
            saved_video_url: "https://files.example/abc.mp4".into(),
            save_status: SaveStatus::Running,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(entry.save_status, SaveStatus::Saved);
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let threshold = Duration::from_secs(20 * 60);

        let old = entry_at(SaveStatus::Running, 21, now);
        assert_eq!(old.effective_status(now, threshold), SaveStatus::Error);
        assert_eq!(old.save_status, SaveStatus::Running);

        let fresh = entry_at(SaveStatus::Running, 19, now);
        assert_eq!(fresh.effective_status(now, threshold), SaveStatus::Running);

        let saved = entry_at(SaveStatus::Saved, 300, now);
        assert_eq!(saved.effective_status(now, threshold), SaveStatus::Saved);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(SaveStatus::parse("already_saved"), SaveStatus::Saved);
        assert_eq!(SaveStatus::parse("manual_required"), SaveStatus::None);
        assert!(SaveStatus::parse("started").is_pending());
    }
}
