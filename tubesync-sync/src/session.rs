//! Session context
//!
//! One [`SessionContext`] owns every component of a client session: the
//! backend repository, the persisted stores, the job registry, the recent
//! cache, the gate and the services. Every background task (the transport
//! and the save monitors) belongs to it, and [`SessionContext::shutdown`]
//! tears all of them down.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tubesync_client::{BackendClient, ClientError};
use tubesync_core::domain::job::{Job, JobKindTag};
use tubesync_core::domain::task::{ExecutionMode, TaskKind};
use tubesync_core::dto::job::StartTestRunRequest;
use tubesync_core::dto::media::MediaKind;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::events::{EventBus, SyncEvent, TransportStatus};
use crate::gate::TaskExclusionGate;
use crate::inference::{InferenceAdapter, StatusSink};
use crate::lock;
use crate::monitor::{MonitorConfig, SaveProgressMonitor};
use crate::prefs::PreferenceStore;
use crate::progress::SaveProgressStore;
use crate::recent::{RecentCache, RecentItem};
use crate::registry::JobRegistry;
use crate::repository::BackendRepository;
use crate::service::{DownloadService, LinkOutcome, NotesError, NotesOutcome, NotesService, SaveOutcome};
use crate::store::{FileStore, KeyValueStore, StoreError};
use crate::transport::{TransportChannel, TransportConfig};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ClientError),

    #[error(transparent)]
    Notes(#[from] NotesError),
}

pub struct SessionContext {
    id: Uuid,
    config: SyncConfig,
    events: EventBus,
    api: Arc<dyn BackendRepository>,
    registry: Arc<JobRegistry>,
    recent: Arc<RecentCache>,
    progress: Arc<SaveProgressStore>,
    gate: Arc<TaskExclusionGate>,
    prefs: PreferenceStore,
    downloads: DownloadService,
    notes: NotesService,
    transport: Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Builds a session with a file store under `state_dir` and the HTTP backend
    pub fn from_config(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::Config)?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.state_dir)?);
        let api: Arc<dyn BackendRepository> = Arc::new(BackendClient::new(config.backend_url.clone()));
        Self::new(config, api, store)
    }

    /// Builds a session over an explicit repository and store
    pub fn new(config: SyncConfig, api: Arc<dyn BackendRepository>, store: Arc<dyn KeyValueStore>) -> Result<Self, SyncError> {
        let inference = Arc::new(InferenceAdapter::from_config(&config.inference));
        Self::with_inference(config, api, store, inference)
    }

    /// Builds a session with a prepared inference adapter
    pub fn with_inference(
        config: SyncConfig,
        api: Arc<dyn BackendRepository>,
        store: Arc<dyn KeyValueStore>,
        inference: Arc<InferenceAdapter>,
    ) -> Result<Self, SyncError> {
        config.validate().map_err(SyncError::Config)?;

        let events = EventBus::new();
        let registry = Arc::new(JobRegistry::new(events.clone(), config.reject_stale_job_updates));
        let recent = Arc::new(RecentCache::new(
            Arc::clone(&store),
            events.clone(),
            config.recent_cap,
            config.stale_after,
        ));
        let progress = Arc::new(SaveProgressStore::new(events.clone()));
        let gate = Arc::new(TaskExclusionGate::new(events.clone()));
        let monitor = Arc::new(SaveProgressMonitor::new(
            Arc::clone(&api),
            Arc::clone(&recent),
            Arc::clone(&progress),
            MonitorConfig::from(&config),
        ));
        let downloads = DownloadService::new(Arc::clone(&api), Arc::clone(&recent), Arc::clone(&progress), monitor);
        let notes = NotesService::new(Arc::clone(&api), Arc::clone(&gate), inference);

        let id = Uuid::new_v4();
        debug!(session = %id, backend = %config.backend_url, "Session created");

        Ok(Self {
            id,
            config,
            events,
            api,
            registry,
            recent,
            progress,
            gate,
            prefs: PreferenceStore::new(store),
            downloads,
            notes,
            transport: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn recent(&self) -> &RecentCache {
        &self.recent
    }

    pub fn progress(&self) -> &SaveProgressStore {
        &self.progress
    }

    pub fn gate(&self) -> &TaskExclusionGate {
        &self.gate
    }

    pub fn prefs(&self) -> &PreferenceStore {
        &self.prefs
    }

    pub fn downloads(&self) -> &DownloadService {
        &self.downloads
    }

    pub fn notes(&self) -> &NotesService {
        &self.notes
    }

    /// Starts the live-update transport
    ///
    /// Calling it again while the transport runs does nothing.
    pub fn start(&self) {
        let mut slot = lock(&self.transport);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let channel = self.transport_channel();
        *slot = Some(tokio::spawn(async move { channel.run().await }));
        info!(session = %self.id, "Session started");
    }

    /// Replaces the registry's listings with one pull of both job kinds
    pub async fn refresh_jobs(&self) -> Result<(), SyncError> {
        self.transport_channel().poll_once().await?;
        Ok(())
    }

    /// Fetches one job and stores the fresh snapshot
    ///
    /// Without `kind` the registry's kind for the id is used; unknown ids are
    /// looked up as a brew first, then as a test run.
    ///
    /// # Returns
    /// The snapshot the registry holds afterwards
    pub async fn refresh_job(&self, job_id: &str, kind: Option<JobKindTag>) -> Result<Job, SyncError> {
        let kinds = match kind.or_else(|| self.registry.get(job_id).map(|j| j.tag())) {
            Some(kind) => vec![kind],
            None => vec![JobKindTag::ResearchBrew, JobKindTag::ComponentTestRun],
        };

        let mut last_error = None;
        for kind in kinds {
            match self.api.get_job(kind, job_id).await {
                Ok(job) => {
                    self.registry.upsert(job.clone());
                    return Ok(self.registry.get(job_id).unwrap_or(job));
                }
                Err(e) => {
                    debug!(job_id, kind = kind.as_str(), "Job lookup failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ClientError::InvalidRequest(format!("unknown job {job_id}")))
            .into())
    }

    fn transport_channel(&self) -> TransportChannel {
        TransportChannel::new(
            Arc::clone(&self.api),
            Arc::clone(&self.registry),
            self.events.clone(),
            TransportConfig::from(&self.config),
        )
    }

    /// Reconciles the recent list with the server's saved videos
    pub async fn refresh_videos(&self) -> Result<Vec<RecentItem>, SyncError> {
        let videos = self.api.list_videos().await?;
        Ok(self.recent.reconcile(videos, Utc::now()))
    }

    /// Recent downloads as currently known, without a server round trip
    pub fn recent_view(&self) -> Vec<RecentItem> {
        self.recent.read_view(Utc::now())
    }

    /// Starts a research brew with the saved filter preferences
    ///
    /// The new job is registered and selected.
    pub async fn start_brew(&self, topic: &str) -> Result<Job, SyncError> {
        if topic.trim().is_empty() {
            return Err(ClientError::InvalidRequest("topic is required".into()).into());
        }
        let request = self.prefs.brew_filters().request(topic);
        let job = self.api.start_brew(&request).await?;
        self.register_started(&job);
        Ok(job)
    }

    pub async fn start_test_run(&self, component: &str) -> Result<Job, SyncError> {
        let component = component.trim();
        if component.is_empty() {
            return Err(ClientError::InvalidRequest("component is required".into()).into());
        }
        let request = StartTestRunRequest {
            component: component.to_string(),
        };
        let job = self.api.start_test_run(&request).await?;
        self.register_started(&job);
        Ok(job)
    }

    fn register_started(&self, job: &Job) {
        self.registry.upsert(job.clone());
        self.registry.select(job.tag(), job.id());
        self.prefs.update(|p| p.last_job_id = job.id().to_string());
        info!(job_id = job.id(), kind = job.tag().as_str(), "Job started");
    }

    pub async fn build_link(&self, url: &str, kind: MediaKind) -> Result<LinkOutcome, SyncError> {
        Ok(self.downloads.build_link(url, kind).await?)
    }

    pub async fn start_save(&self, url: &str) -> Result<SaveOutcome, SyncError> {
        Ok(self.downloads.start_save(url).await?)
    }

    /// Asks a question in the execution mode chosen in the preferences
    pub async fn ask(&self, video_id: &str, question: &str, on_status: StatusSink<'_>) -> Result<NotesOutcome, SyncError> {
        let mode = self.remember_video(video_id, TaskKind::Ask);
        Ok(self.notes.ask(video_id, question, mode, on_status).await?)
    }

    /// Analyzes a video in the execution mode chosen in the preferences
    pub async fn analyze(&self, video_id: &str, force: bool, on_status: StatusSink<'_>) -> Result<NotesOutcome, SyncError> {
        let mode = self.remember_video(video_id, TaskKind::Analyze);
        Ok(self.notes.analyze(video_id, force, mode, on_status).await?)
    }

    fn remember_video(&self, video_id: &str, kind: TaskKind) -> ExecutionMode {
        self.prefs
            .update(|p| p.last_video_id = video_id.to_string())
            .execution_mode(kind)
    }

    /// Stops the transport and every save monitor
    pub fn shutdown(&self) {
        let transport = lock(&self.transport).take();
        if let Some(handle) = transport {
            handle.abort();
            self.events.emit(SyncEvent::Transport(TransportStatus::Stopped));
        }
        self.downloads.shutdown();
        debug!(session = %self.id, "Session stopped");
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ChunkConfig, InferenceProvider, InferenceStatus};
    use crate::store::MemoryStore;
    use crate::testing::{FakeBackend, FakeProvider, job, saved_video};
    use tubesync_core::dto::video::VideoDetail;

    struct Fixture {
        api: Arc<FakeBackend>,
        provider: Arc<FakeProvider>,
        session: SessionContext,
    }

    fn fixture() -> Fixture {
        let api = FakeBackend::new();
        let provider = Arc::new(FakeProvider::new(
            "runtime",
            Arc::new(|_: &str, _: &str| "Local notes".to_string()),
        ));
        let inference = Arc::new(InferenceAdapter::new(
            vec![Arc::clone(&provider) as Arc<dyn InferenceProvider>],
            ChunkConfig::default(),
            4_000,
        ));
        let session = SessionContext::with_inference(
            SyncConfig::default(),
            Arc::clone(&api) as Arc<dyn BackendRepository>,
            Arc::new(MemoryStore::new()),
            inference,
        )
        .unwrap();
        Fixture { api, provider, session }
    }

    fn quiet() -> impl Fn(InferenceStatus) + Send + Sync {
        |_| {}
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SyncConfig::new("ftp://example.com".into());
        let result = SessionContext::new(config, FakeBackend::new(), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_started_brew_is_registered_and_selected() {
        let f = fixture();

        let job = f.session.start_brew("home espresso").await.unwrap();

        assert_eq!(job.id(), "brew-1");
        assert!(f.session.registry().get("brew-1").is_some());
        assert_eq!(
            f.session.registry().selected_job(JobKindTag::ResearchBrew).map(|j| j.id().to_string()),
            Some("brew-1".to_string())
        );
        assert_eq!(f.session.prefs().load().last_job_id, "brew-1");
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected() {
        let f = fixture();
        assert!(matches!(f.session.start_brew("  ").await, Err(SyncError::Api(_))));
        assert!(f.session.registry().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_follows_execution_mode_preference() {
        let f = fixture();
        *f.api.video_detail.lock().unwrap() = VideoDetail {
            video_id: "abc123XYZ".into(),
            transcript_preview: "Tamp evenly before pulling the shot.".into(),
            ..VideoDetail::default()
        };
        f.session.prefs().set_execution_mode(TaskKind::Analyze, ExecutionMode::Local);

        let outcome = f.session.analyze("abc123XYZ", false, &quiet()).await.unwrap();

        assert!(matches!(outcome, NotesOutcome::Analysis { stored: true, .. }));
        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(f.session.prefs().load().last_video_id, "abc123XYZ");
    }

    #[tokio::test]
    async fn test_refresh_jobs_lists_both_kinds() {
        let f = fixture();
        f.api.set_jobs(
            JobKindTag::ResearchBrew,
            vec![job(JobKindTag::ResearchBrew, "b1", "running", "2026-01-01T10:00:00Z")],
        );
        f.api.set_jobs(
            JobKindTag::ComponentTestRun,
            vec![job(JobKindTag::ComponentTestRun, "t1", "completed", "2026-01-01T09:00:00Z")],
        );

        f.session.refresh_jobs().await.unwrap();

        assert_eq!(f.session.registry().len(), 2);
        assert_eq!(f.session.registry().active_jobs(None).len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_job_finds_unknown_kind_and_stores_it() {
        let f = fixture();
        f.api.set_jobs(
            JobKindTag::ComponentTestRun,
            vec![job(JobKindTag::ComponentTestRun, "t1", "completed", "2026-01-01T09:00:00Z")],
        );

        let job = f.session.refresh_job("t1", None).await.unwrap();

        assert_eq!(job.tag(), JobKindTag::ComponentTestRun);
        assert!(f.session.registry().get("t1").is_some());
        assert!(matches!(
            f.session.refresh_job("missing", None).await,
            Err(SyncError::Api(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_videos_reconciles_recent() {
        let f = fixture();
        f.api
            .script_videos(vec![vec![saved_video("abc123XYZ", "https://files.example/abc.mp4")]]);

        let view = f.session.refresh_videos().await.unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view[0].entry.saved_video_url, "https://files.example/abc.mp4");
        assert_eq!(f.session.recent_view().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_transport() {
        let f = fixture();
        let mut rx = f.session.events().subscribe();

        f.session.start();
        f.session.start();
        tokio::task::yield_now().await;
        f.session.shutdown();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::Transport(status) = event {
                statuses.push(status);
            }
        }
        assert_eq!(statuses.last(), Some(&TransportStatus::Stopped));
        assert_eq!(statuses.iter().filter(|s| **s == TransportStatus::Stopped).count(), 1);
    }
}
