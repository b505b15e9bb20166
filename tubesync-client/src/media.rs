//! Direct media link and server save endpoints

use tubesync_core::dto::media::{DirectLinkResponse, MediaKind, SaveResponse, UrlRequest};

use crate::BackendClient;
use crate::error::{ClientError, Result};

impl BackendClient {
    /// Build a direct, provider-issued media link for a source URL
    ///
    /// The link is ephemeral. If the provider blocks direct links the response
    /// may instead report a server-side save.
    pub async fn build_link(&self, url: &str, kind: MediaKind) -> Result<DirectLinkResponse> {
        let path = match kind {
            MediaKind::Video => "/api/direct_video",
            MediaKind::Audio => "/api/direct_audio",
        };
        let response = self
            .client
            .post(self.url(path))
            .json(&url_request(url)?)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Start (or re-check) a server-side save of a source URL
    ///
    /// # Returns
    /// `already_saved` with the confirmed URL, `started`, or a busy signal when
    /// another save is running
    pub async fn start_save(&self, url: &str) -> Result<SaveResponse> {
        let response = self
            .client
            .post(self.url("/api/direct_save_server"))
            .json(&url_request(url)?)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

fn url_request(url: &str) -> Result<UrlRequest> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ClientError::InvalidRequest("url is required".into()));
    }
    Ok(UrlRequest {
        url: url.to_string(),
    })
}
