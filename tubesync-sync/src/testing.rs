//! Scripted fakes shared by the unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tubesync_client::ClientError;
use tubesync_core::domain::job::{Job, JobKindTag};
use tubesync_core::dto::job::{StartBrewRequest, StartTestRunRequest};
use tubesync_core::dto::media::{DirectLinkResponse, MediaKind, SaveResponse};
use tubesync_core::dto::notes::{AnalyzeRequest, AnalyzeStoreRequest, AskRequest, NotesResponse};
use tubesync_core::dto::runtime::RuntimeInfo;
use tubesync_core::dto::video::{TaskProgress, VideoDetail, VideoSummary};

use crate::inference::{InferenceError, InferenceProvider, InferenceSession, StatusSink};
use crate::lock;
use crate::repository::{ApiResult, BackendRepository};

pub fn job_json(id: &str, status: &str, updated_at: &str) -> Value {
    json!({
        "job_id": id,
        "status": status,
        "updated_at": updated_at,
        "progress": {"step": 1, "total_steps": 4, "ratio": 0.25},
        "topic": "espresso",
    })
}

pub fn job(kind: JobKindTag, id: &str, status: &str, updated_at: &str) -> Job {
    Job::from_snapshot(kind, &job_json(id, status, updated_at)).unwrap()
}

pub fn saved_video(video_id: &str, public_url: &str) -> VideoSummary {
    VideoSummary {
        video_id: video_id.to_string(),
        title: format!("Video {video_id}"),
        source_url: format!("https://www.youtube.com/watch?v={video_id}"),
        public_url: public_url.to_string(),
        ..VideoSummary::default()
    }
}

/// In-memory backend with scripted responses
#[derive(Default)]
pub struct FakeBackend {
    pub runtime: Mutex<RuntimeInfo>,
    pub jobs: Mutex<HashMap<JobKindTag, Vec<Job>>>,
    /// Successive `list_videos` results; the last one repeats
    pub video_script: Mutex<Vec<Vec<VideoSummary>>>,
    pub video_detail: Mutex<VideoDetail>,
    pub link_response: Mutex<DirectLinkResponse>,
    pub save_response: Mutex<SaveResponse>,
    pub save_error: Mutex<Option<String>>,
    pub ask_response: Mutex<NotesResponse>,
    pub analyze_response: Mutex<NotesResponse>,
    pub stored_analyses: Mutex<Vec<AnalyzeStoreRequest>>,
    pub list_videos_calls: AtomicUsize,
    pub start_save_calls: AtomicUsize,
    pub ask_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_jobs(&self, kind: JobKindTag, jobs: Vec<Job>) {
        lock(&self.jobs).insert(kind, jobs);
    }

    pub fn script_videos(&self, script: Vec<Vec<VideoSummary>>) {
        *lock(&self.video_script) = script;
    }
}

#[async_trait]
impl BackendRepository for FakeBackend {
    async fn runtime(&self) -> ApiResult<RuntimeInfo> {
        Ok(lock(&self.runtime).clone())
    }

    async fn list_jobs(&self, kind: JobKindTag, active_only: bool) -> ApiResult<Vec<Job>> {
        let jobs = lock(&self.jobs).get(&kind).cloned().unwrap_or_default();
        Ok(jobs
            .into_iter()
            .filter(|j| !active_only || j.is_active())
            .collect())
    }

    async fn get_job(&self, kind: JobKindTag, job_id: &str) -> ApiResult<Job> {
        lock(&self.jobs)
            .get(&kind)
            .and_then(|jobs| jobs.iter().find(|j| j.id() == job_id).cloned())
            .ok_or_else(|| ClientError::api_error(404, "job not found"))
    }

    async fn start_brew(&self, req: &StartBrewRequest) -> ApiResult<Job> {
        let raw = json!({"job_id": "brew-1", "status": "queued", "topic": req.topic});
        Ok(Job::from_snapshot(JobKindTag::ResearchBrew, &raw).unwrap())
    }

    async fn start_test_run(&self, req: &StartTestRunRequest) -> ApiResult<Job> {
        let raw = json!({"job_id": "test-1", "status": "queued", "component": req.component});
        Ok(Job::from_snapshot(JobKindTag::ComponentTestRun, &raw).unwrap())
    }

    async fn list_videos(&self) -> ApiResult<Vec<VideoSummary>> {
        let call = self.list_videos_calls.fetch_add(1, Ordering::SeqCst);
        let script = lock(&self.video_script);
        if script.is_empty() {
            return Ok(Vec::new());
        }
        Ok(script[call.min(script.len() - 1)].clone())
    }

    async fn get_video(&self, _video_id: &str) -> ApiResult<VideoDetail> {
        Ok(lock(&self.video_detail).clone())
    }

    async fn build_link(&self, _url: &str, _kind: MediaKind) -> ApiResult<DirectLinkResponse> {
        Ok(lock(&self.link_response).clone())
    }

    async fn start_save(&self, _url: &str) -> ApiResult<SaveResponse> {
        self.start_save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = lock(&self.save_error).clone() {
            return Err(ClientError::Failure(message));
        }
        Ok(lock(&self.save_response).clone())
    }

    async fn ask(&self, _req: &AskRequest) -> ApiResult<NotesResponse> {
        self.ask_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.ask_response).clone())
    }

    async fn analyze(&self, _req: &AnalyzeRequest) -> ApiResult<NotesResponse> {
        Ok(lock(&self.analyze_response).clone())
    }

    async fn store_analysis(&self, req: &AnalyzeStoreRequest) -> ApiResult<NotesResponse> {
        lock(&self.stored_analyses).push(req.clone());
        Ok(NotesResponse {
            video_id: req.video_id.clone(),
            status: "done".into(),
            analysis: req.analysis.clone(),
            ..NotesResponse::default()
        })
    }

    async fn analyze_progress(&self, _video_id: &str) -> ApiResult<TaskProgress> {
        let detail = lock(&self.video_detail).clone();
        let mut progress = detail.notes_progress.analyze;
        if progress.status.is_empty() {
            progress.status = "idle".into();
        }
        Ok(progress)
    }
}

pub type Responder = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

/// Provider whose session answers through a closure and records every call
pub struct FakeProvider {
    pub name: String,
    pub available: bool,
    pub fail_init: bool,
    pub init_calls: AtomicUsize,
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    responder: Responder,
}

impl FakeProvider {
    pub fn new(name: &str, responder: Responder) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            fail_init: false,
            init_calls: AtomicUsize::new(0),
            calls: Arc::new(Mutex::new(Vec::new())),
            responder,
        }
    }

    pub fn unavailable(name: &str) -> Self {
        let mut provider = Self::new(name, Arc::new(|_: &str, _: &str| String::new()));
        provider.available = false;
        provider
    }

    pub fn failing(name: &str) -> Self {
        let mut provider = Self::new(name, Arc::new(|_: &str, _: &str| String::new()));
        provider.fail_init = true;
        provider
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

struct FakeSession {
    label: String,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    responder: Responder,
}

#[async_trait]
impl InferenceSession for FakeSession {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        lock(&self.calls).push((system.to_string(), user.to_string()));
        Ok((self.responder)(system, user))
    }
}

#[async_trait]
impl InferenceProvider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn available(&self) -> bool {
        self.available
    }

    async fn init(&self, _on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent callers overlap with an in-flight init
        tokio::task::yield_now().await;
        if self.fail_init {
            return Err(InferenceError::Init {
                provider: self.name.clone(),
                message: "model failed to load".into(),
            });
        }
        Ok(Arc::new(FakeSession {
            label: format!("{}:fake", self.name),
            calls: Arc::clone(&self.calls),
            responder: Arc::clone(&self.responder),
        }))
    }
}
