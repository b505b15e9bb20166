//! Data Transfer Objects
//!
//! Wire shapes of the backend REST surface and the push channel. Every REST
//! response is a JSON object with an `ok` flag; the payload fields sit next
//! to it.

pub mod job;
pub mod media;
pub mod notes;
pub mod push;
pub mod runtime;
pub mod video;

use serde::{Deserialize, Serialize};

/// `{"ok": true, "item": ...}` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResponse<T> {
    pub item: T,
}

/// `{"ok": true, "items": [...]}` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
