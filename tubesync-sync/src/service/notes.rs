//! Notes flow: ask and analyze
//!
//! Both tasks hold the exclusion gate for their video while they run. In
//! server mode the backend does the work; in local mode the transcript is
//! fetched and inference runs on this device, and analyses are stored back
//! on the server.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use tubesync_client::ClientError;
use tubesync_core::domain::task::{ExecutionMode, TaskKind, TaskOrigin};
use tubesync_core::dto::notes::{AnalyzeRequest, AnalyzeStoreRequest, AskRequest};
use tubesync_core::dto::video::TaskProgress;

use crate::gate::{GateRejection, TaskExclusionGate};
use crate::inference::{InferenceAdapter, InferenceError, StatusSink};
use crate::repository::BackendRepository;

const SERVER_BACKEND: &str = "server";

#[derive(Debug, Error)]
pub enum NotesError {
    #[error(transparent)]
    Api(#[from] ClientError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("No transcript is available for video {0}")]
    NoTranscript(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotesOutcome {
    Answer {
        text: String,
        backend: String,
        cached: bool,
    },
    Analysis {
        text: String,
        backend: String,
        /// `true` once the analysis is stored on the server
        stored: bool,
    },
    /// Another task holds the video; nothing was started
    Busy {
        message: String,
        origin: TaskOrigin,
        progress: Option<TaskProgress>,
    },
}

impl NotesOutcome {
    fn rejected(rejection: GateRejection) -> Self {
        let origin = match &rejection {
            GateRejection::AlreadyRunning { .. } => TaskOrigin::Local,
            GateRejection::BlockedBy { origin, .. } => *origin,
        };
        Self::Busy {
            message: rejection.message(),
            origin,
            progress: None,
        }
    }

    fn running_elsewhere(kind: TaskKind, progress: Option<TaskProgress>) -> Self {
        Self::Busy {
            message: format!("{kind} is already running for this video in another session"),
            origin: TaskOrigin::Remote,
            progress,
        }
    }
}

/// Releases the local gate lock when the task ends, however it ends
struct TaskGuard<'a> {
    gate: &'a TaskExclusionGate,
    video_id: &'a str,
    kind: TaskKind,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.gate.finish(self.video_id, self.kind);
    }
}

struct Transcript {
    title: String,
    text: String,
}

pub struct NotesService {
    api: Arc<dyn BackendRepository>,
    gate: Arc<TaskExclusionGate>,
    inference: Arc<InferenceAdapter>,
}

impl NotesService {
    pub fn new(api: Arc<dyn BackendRepository>, gate: Arc<TaskExclusionGate>, inference: Arc<InferenceAdapter>) -> Self {
        Self { api, gate, inference }
    }

    fn begin<'a>(&'a self, video_id: &'a str, kind: TaskKind) -> Result<TaskGuard<'a>, GateRejection> {
        self.gate.try_start(video_id, kind)?;
        Ok(TaskGuard {
            gate: &self.gate,
            video_id,
            kind,
        })
    }

    /// Answers `question` about a video
    pub async fn ask(
        &self,
        video_id: &str,
        question: &str,
        mode: ExecutionMode,
        on_status: StatusSink<'_>,
    ) -> Result<NotesOutcome, NotesError> {
        let _guard = match self.begin(video_id, TaskKind::Ask) {
            Ok(guard) => guard,
            Err(rejection) => return Ok(NotesOutcome::rejected(rejection)),
        };

        match mode {
            ExecutionMode::Server => {
                let request = AskRequest {
                    video_id: video_id.to_string(),
                    question: question.to_string(),
                };
                let response = self.api.ask(&request).await?;
                if response.is_already_running() {
                    self.gate.absorb_server_busy(video_id, TaskKind::Ask);
                    return Ok(NotesOutcome::running_elsewhere(TaskKind::Ask, response.item));
                }
                Ok(NotesOutcome::Answer {
                    text: response.answer,
                    backend: SERVER_BACKEND.to_string(),
                    cached: response.cached,
                })
            }
            ExecutionMode::Local => {
                let transcript = self.transcript(video_id).await?;
                let output = self.inference.ask(question, &transcript.text, on_status).await?;
                debug!(video_id, evidence_pass = output.evidence_pass, "Answered on device");
                Ok(NotesOutcome::Answer {
                    text: output.text,
                    backend: output.backend,
                    cached: false,
                })
            }
        }
    }

    /// Produces notes for a video
    ///
    /// `force` asks the server to discard a cached analysis.
    pub async fn analyze(
        &self,
        video_id: &str,
        force: bool,
        mode: ExecutionMode,
        on_status: StatusSink<'_>,
    ) -> Result<NotesOutcome, NotesError> {
        let _guard = match self.begin(video_id, TaskKind::Analyze) {
            Ok(guard) => guard,
            Err(rejection) => return Ok(NotesOutcome::rejected(rejection)),
        };

        match mode {
            ExecutionMode::Server => {
                let request = AnalyzeRequest {
                    video_id: video_id.to_string(),
                    force,
                    save: true,
                };
                let response = self.api.analyze(&request).await?;
                if response.is_already_running() {
                    self.gate.absorb_server_busy(video_id, TaskKind::Analyze);
                    return Ok(NotesOutcome::running_elsewhere(TaskKind::Analyze, response.item));
                }
                Ok(NotesOutcome::Analysis {
                    text: response.analysis,
                    backend: SERVER_BACKEND.to_string(),
                    stored: true,
                })
            }
            ExecutionMode::Local => {
                let transcript = self.transcript(video_id).await?;
                let output = self
                    .inference
                    .analyze(&transcript.title, &transcript.text, on_status)
                    .await?;

                let request = AnalyzeStoreRequest {
                    video_id: video_id.to_string(),
                    analysis: output.text.clone(),
                    llm_backend: "local".to_string(),
                    llm_backend_detail: output.backend.clone(),
                };
                let stored = match self.api.store_analysis(&request).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(video_id, "Failed to store local analysis: {}", e);
                        false
                    }
                };
                info!(video_id, windows = output.windows, stored, "Analyzed on device");

                Ok(NotesOutcome::Analysis {
                    text: output.text,
                    backend: output.backend,
                    stored,
                })
            }
        }
    }

    async fn transcript(&self, video_id: &str) -> Result<Transcript, NotesError> {
        let detail = self.api.get_video(video_id).await?;
        let text = detail.transcript_preview.trim();
        if text.is_empty() {
            return Err(NotesError::NoTranscript(video_id.to_string()));
        }
        let title = if detail.title.trim().is_empty() {
            video_id.to_string()
        } else {
            detail.title.trim().to_string()
        };
        Ok(Transcript {
            title,
            text: text.to_string(),
        })
    }

    /// Refreshes the remote locks of a video from the server's busy task
    ///
    /// Kinds this client is running itself are not recorded as remote.
    ///
    /// # Returns
    /// The kinds now observed as running elsewhere
    pub async fn refresh_remote(&self, video_id: &str) -> Result<Vec<TaskKind>, ClientError> {
        let detail = self.api.get_video(video_id).await?;
        let progress = &detail.notes_progress;

        let mut busy = Vec::new();
        for (kind, task) in [(TaskKind::Ask, &progress.ask), (TaskKind::Analyze, &progress.analyze)] {
            if progress.busy_task == kind.as_str() || task.in_progress {
                busy.push(kind);
            }
        }
        let local = self.local_kinds(video_id);
        busy.retain(|kind| !local.contains(kind));

        self.gate.sync_remote(video_id, &busy);
        Ok(busy)
    }

    /// Fetches server-side analysis progress and mirrors it into the gate
    pub async fn analyze_progress(&self, video_id: &str) -> Result<TaskProgress, ClientError> {
        let progress = self.api.analyze_progress(video_id).await?;
        if self.local_kinds(video_id).contains(&TaskKind::Analyze) {
            return Ok(progress);
        }
        if progress.in_progress && !progress.done {
            self.gate.observe_remote(video_id, TaskKind::Analyze);
        } else {
            self.gate.clear_remote(video_id, TaskKind::Analyze);
        }
        Ok(progress)
    }

    fn local_kinds(&self, video_id: &str) -> Vec<TaskKind> {
        self.gate
            .active(video_id)
            .into_iter()
            .filter(|l| l.origin == TaskOrigin::Local)
            .map(|l| l.task_kind)
            .collect()
    }
}
