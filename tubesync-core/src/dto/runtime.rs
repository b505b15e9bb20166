//! Runtime discovery DTOs

use serde::{Deserialize, Serialize};

/// Push channel advertisement returned by `GET /api/runtime`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeInfo {
    pub ws_enabled: bool,
    pub ws_port: u16,
    pub ws_path: String,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub runtime: RuntimeInfo,
}
