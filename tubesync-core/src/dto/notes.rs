//! Ask and analyze DTOs

use serde::{Deserialize, Serialize};

use super::video::TaskProgress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub video_id: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub video_id: String,
    pub force: bool,
    pub save: bool,
}

/// Stores an analysis that was produced on this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeStoreRequest {
    pub video_id: String,
    pub analysis: String,
    pub llm_backend: String,
    pub llm_backend_detail: String,
}

/// Response of `POST /api/ask`, `POST /api/analyze` and `POST /api/analyze_store`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotesResponse {
    pub video_id: String,
    pub status: String,
    pub in_progress: bool,
    /// Progress snapshot, present when the task is already running
    pub item: Option<TaskProgress>,
    pub answer: String,
    pub analysis: String,
    pub cached: bool,
    pub lang: String,
    pub elapsed_sec: f64,
}

impl NotesResponse {
    /// The server was already running this task for the video
    pub fn is_already_running(&self) -> bool {
        self.status == "already_running"
    }
}
