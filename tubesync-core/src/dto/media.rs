//! Direct link and server save DTOs

use serde::{Deserialize, Serialize};

/// Media kind of a direct link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

/// Response of `POST /api/direct_video` and `POST /api/direct_audio`
///
/// When the provider refuses a direct link the backend may fall back to a
/// server-side save and reports it through the `save_*` fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectLinkResponse {
    pub video_id: String,
    pub title: String,
    pub download_url: String,
    pub media_type: String,
    pub temporary: bool,
    pub save_started: bool,
    pub save_status: String,
    pub save_busy: bool,
    pub save_busy_message: String,
    pub save_job_id: String,
    pub public_url: String,
    pub fallback_reason: String,
}

/// Response of `POST /api/direct_save_server`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveResponse {
    pub save_job_id: String,
    pub video_id: String,
    pub title: String,
    pub url: String,
    pub public_url: String,
    /// `started`, `already_saved` or `busy`
    pub status: String,
    pub busy: bool,
    pub busy_message: String,
}

impl SaveResponse {
    pub fn is_busy(&self) -> bool {
        self.busy || self.status.eq_ignore_ascii_case("busy")
    }
}
