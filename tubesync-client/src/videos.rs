//! Saved video endpoints

use tubesync_core::dto::video::{VideoDetail, VideoSummary};
use tubesync_core::dto::{ItemResponse, ItemsResponse};

use crate::BackendClient;
use crate::error::{ClientError, Result};

impl BackendClient {
    /// List every video known to the server
    ///
    /// This is the server truth the recent downloads cache is reconciled against.
    pub async fn list_videos(&self) -> Result<Vec<VideoSummary>> {
        let response = self.client.get(self.url("/api/videos")).send().await?;
        let body: ItemsResponse<VideoSummary> = self.handle_response(response).await?;
        Ok(body.items)
    }

    /// Get one video with its transcript, analysis and notes progress
    pub async fn get_video(&self, video_id: &str) -> Result<VideoDetail> {
        if video_id.trim().is_empty() {
            return Err(ClientError::InvalidRequest("video_id is required".into()));
        }
        let response = self
            .client
            .get(self.url("/api/video"))
            .query(&[("video_id", video_id)])
            .send()
            .await?;

        let body: ItemResponse<VideoDetail> = self.handle_response(response).await?;
        Ok(body.item)
    }
}
