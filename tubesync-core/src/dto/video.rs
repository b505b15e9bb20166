//! Video DTOs

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of `GET /api/videos`, the server truth for recent downloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub source_url: String,
    /// Confirmed saved-file URL, empty while nothing is saved
    pub public_url: String,
    pub youtube_url: String,
    pub thumbnail_url: String,
    pub has_transcript: bool,
    pub has_analysis: bool,
    pub transcript_updated_at_epoch: i64,
    pub analysis_saved_at_epoch: i64,
}

impl VideoSummary {
    /// Latest server-side activity, in seconds since the epoch
    pub fn last_activity_epoch(&self) -> i64 {
        self.transcript_updated_at_epoch.max(self.analysis_saved_at_epoch)
    }
}

/// Progress of one notes task as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProgress {
    pub status: String,
    pub done: bool,
    pub message: String,
    pub in_progress: bool,
}

/// Which notes task the server is currently running for a video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesProgress {
    pub video_id: String,
    pub busy_task: String,
    pub ask: TaskProgress,
    pub analyze: TaskProgress,
}

/// `GET /api/video?video_id=...`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDetail {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub transcript_exists: bool,
    pub transcript_preview: String,
    pub analysis_text: String,
    pub analysis_lang: String,
    pub source_url: String,
    pub public_url: String,
    pub thumbnail_url: String,
    pub notes_progress: NotesProgress,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
