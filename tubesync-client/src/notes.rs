//! Transcript notes endpoints (ask, analyze)

use tubesync_core::dto::notes::{AnalyzeRequest, AnalyzeStoreRequest, AskRequest, NotesResponse};
use tubesync_core::dto::ItemResponse;
use tubesync_core::dto::video::TaskProgress;

use crate::BackendClient;
use crate::error::Result;

impl BackendClient {
    /// Ask a question about a video transcript
    ///
    /// Answers `status = "already_running"` when another ask for the same
    /// video is in flight on the server.
    pub async fn ask(&self, req: &AskRequest) -> Result<NotesResponse> {
        let response = self.client.post(self.url("/api/ask")).json(req).send().await?;
        self.handle_response(response).await
    }

    /// Run the transcript analysis of a video on the server
    pub async fn analyze(&self, req: &AnalyzeRequest) -> Result<NotesResponse> {
        let response = self
            .client
            .post(self.url("/api/analyze"))
            .json(req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Store an analysis produced on this device
    pub async fn store_analysis(&self, req: &AnalyzeStoreRequest) -> Result<NotesResponse> {
        let response = self
            .client
            .post(self.url("/api/analyze_store"))
            .json(req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Current server-side analysis progress of a video
    pub async fn analyze_progress(&self, video_id: &str) -> Result<TaskProgress> {
        let response = self
            .client
            .get(self.url("/api/analyze_progress"))
            .query(&[("video_id", video_id)])
            .send()
            .await?;
        let body: ItemResponse<TaskProgress> = self.handle_response(response).await?;
        Ok(body.item)
    }
}
