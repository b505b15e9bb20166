//! Job DTOs

use serde::{Deserialize, Serialize};

/// Request to start a research brew
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartBrewRequest {
    pub topic: String,
    pub private_run: bool,
    pub max_videos: u32,
    pub max_queries: u32,
    pub per_query: u32,
    pub min_duration_sec: u32,
    pub max_duration_sec: u32,
    pub captions_only: bool,
}

/// Request to start a component test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTestRunRequest {
    pub component: String,
}
