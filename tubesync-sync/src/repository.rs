//! Backend repository
//!
//! The sync components talk to the backend only through [`BackendRepository`],
//! which keeps them independent of the HTTP client and lets tests substitute
//! scripted fakes.

use async_trait::async_trait;
use tubesync_client::{BackendClient, ClientError};
use tubesync_core::domain::job::{Job, JobKindTag};
use tubesync_core::dto::job::{StartBrewRequest, StartTestRunRequest};
use tubesync_core::dto::media::{DirectLinkResponse, MediaKind, SaveResponse};
use tubesync_core::dto::notes::{AnalyzeRequest, AnalyzeStoreRequest, AskRequest, NotesResponse};
use tubesync_core::dto::runtime::RuntimeInfo;
use tubesync_core::dto::video::{TaskProgress, VideoDetail, VideoSummary};

pub type ApiResult<T> = Result<T, ClientError>;

/// Backend operations consumed by the sync layer
#[async_trait]
pub trait BackendRepository: Send + Sync {
    /// Push channel advertisement
    async fn runtime(&self) -> ApiResult<RuntimeInfo>;

    /// Lists jobs of one kind
    ///
    /// # Arguments
    /// * `kind` - Job family
    /// * `active_only` - Restrict to queued and running jobs
    async fn list_jobs(&self, kind: JobKindTag, active_only: bool) -> ApiResult<Vec<Job>>;

    async fn get_job(&self, kind: JobKindTag, job_id: &str) -> ApiResult<Job>;

    /// Starts a research brew and returns its initial snapshot
    async fn start_brew(&self, req: &StartBrewRequest) -> ApiResult<Job>;

    /// Starts a component test run and returns its initial snapshot
    async fn start_test_run(&self, req: &StartTestRunRequest) -> ApiResult<Job>;

    /// Server-confirmed videos
    async fn list_videos(&self) -> ApiResult<Vec<VideoSummary>>;

    async fn get_video(&self, video_id: &str) -> ApiResult<VideoDetail>;

    /// Builds an ephemeral direct media link
    async fn build_link(&self, url: &str, kind: MediaKind) -> ApiResult<DirectLinkResponse>;

    /// Starts or re-checks a server-side save
    async fn start_save(&self, url: &str) -> ApiResult<SaveResponse>;

    async fn ask(&self, req: &AskRequest) -> ApiResult<NotesResponse>;

    async fn analyze(&self, req: &AnalyzeRequest) -> ApiResult<NotesResponse>;

    /// Stores an analysis produced on this device
    async fn store_analysis(&self, req: &AnalyzeStoreRequest) -> ApiResult<NotesResponse>;

    async fn analyze_progress(&self, video_id: &str) -> ApiResult<TaskProgress>;
}

#[async_trait]
impl BackendRepository for BackendClient {
    async fn runtime(&self) -> ApiResult<RuntimeInfo> {
        BackendClient::runtime(self).await
    }

    async fn list_jobs(&self, kind: JobKindTag, active_only: bool) -> ApiResult<Vec<Job>> {
        BackendClient::list_jobs(self, kind, active_only).await
    }

    async fn get_job(&self, kind: JobKindTag, job_id: &str) -> ApiResult<Job> {
        BackendClient::get_job(self, kind, job_id).await
    }

    async fn start_brew(&self, req: &StartBrewRequest) -> ApiResult<Job> {
        BackendClient::start_brew(self, req).await
    }

    async fn start_test_run(&self, req: &StartTestRunRequest) -> ApiResult<Job> {
        BackendClient::start_test_run(self, req).await
    }

    async fn list_videos(&self) -> ApiResult<Vec<VideoSummary>> {
        BackendClient::list_videos(self).await
    }

    async fn get_video(&self, video_id: &str) -> ApiResult<VideoDetail> {
        BackendClient::get_video(self, video_id).await
    }

    async fn build_link(&self, url: &str, kind: MediaKind) -> ApiResult<DirectLinkResponse> {
        BackendClient::build_link(self, url, kind).await
    }

    async fn start_save(&self, url: &str) -> ApiResult<SaveResponse> {
        BackendClient::start_save(self, url).await
    }

    async fn ask(&self, req: &AskRequest) -> ApiResult<NotesResponse> {
        BackendClient::ask(self, req).await
    }

    async fn analyze(&self, req: &AnalyzeRequest) -> ApiResult<NotesResponse> {
        BackendClient::analyze(self, req).await
    }

    async fn store_analysis(&self, req: &AnalyzeStoreRequest) -> ApiResult<NotesResponse> {
        BackendClient::store_analysis(self, req).await
    }

    async fn analyze_progress(&self, video_id: &str) -> ApiResult<TaskProgress> {
        BackendClient::analyze_progress(self, video_id).await
    }
}
