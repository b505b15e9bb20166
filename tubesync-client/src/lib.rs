//! Tubesync HTTP Client
//!
//! A small, type-safe HTTP client for the video operations backend.
//!
//! Every response of the backend is a JSON object carrying an `ok` flag. A
//! non-success status or `"ok": false` both surface as a [`ClientError`] with a
//! human readable message; nothing is retried here.
//!
//! # Example
//!
//! ```no_run
//! use tubesync_client::BackendClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BackendClient::new("http://127.0.0.1:8088");
//!
//!     for video in client.list_videos().await? {
//!         println!("{} {}", video.video_id, video.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod media;
mod notes;
mod videos;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// HTTP client for the backend API
///
/// Methods are organized into logical groups:
/// - Runtime discovery and job lifecycle (brews, component test runs)
/// - Saved videos and their details
/// - Direct media links and server-side saves
/// - Transcript notes (ask, analyze)
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// Base URL of the backend (e.g., "http://127.0.0.1:8088")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the backend (e.g., "http://127.0.0.1:8088")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new backend client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Checks the status code and the `ok` flag, then deserializes the body.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                extract_error_message(&error_text),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        decode_payload(body)
    }
}

/// Decodes a success-status body, honoring the `ok` flag
fn decode_payload<T: DeserializeOwned>(body: Value) -> Result<T> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Request failed")
            .to_string();
        return Err(ClientError::Failure(message));
    }

    serde_json::from_value(body)
        .map_err(|e| ClientError::ParseError(format!("Unexpected response shape: {}", e)))
}

/// Pulls the `error` field out of a JSON error body, or returns the text as-is
fn extract_error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tubesync_core::dto::ItemsResponse;
    use tubesync_core::dto::video::VideoSummary;

    #[test]
    fn test_client_creation() {
        let client = BackendClient::new("http://127.0.0.1:8088");
        assert_eq!(client.base_url(), "http://127.0.0.1:8088");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BackendClient::new("http://127.0.0.1:8088/");
        assert_eq!(client.base_url(), "http://127.0.0.1:8088");
        assert_eq!(client.url("/api/videos"), "http://127.0.0.1:8088/api/videos");
    }

    #[test]
    fn test_ok_false_is_failure() {
        let result: Result<ItemsResponse<VideoSummary>> =
            decode_payload(json!({"ok": false, "error": "url is required"}));
        assert!(matches!(result, Err(ClientError::Failure(m)) if m == "url is required"));
    }

    #[test]
    fn test_payload_decodes_next_to_ok_flag() {
        let result: ItemsResponse<VideoSummary> = decode_payload(json!({
            "ok": true,
            "items": [{"video_id": "abc123", "title": "Coffee", "public_url": ""}]
        }))
        .unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].title, "Coffee");
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(r#"{"ok":false,"error":"job not found"}"#), "job not found");
        assert_eq!(extract_error_message("Bad Gateway\n"), "Bad Gateway");
    }
}
