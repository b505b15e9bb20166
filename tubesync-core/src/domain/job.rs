//! Job domain types
//!
//! A job is one unit of long-running server work. Every observation of a job
//! (push frame, pull listing, POST response) is a complete snapshot and goes
//! through [`Job::from_snapshot`], the only way to build a [`Job`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::NormalizeError;

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Parses the status strings used by the backend
    ///
    /// `done` and `completed` are synonyms. An empty status means the job was
    /// just created and has not been picked up yet.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "queued" | "pending" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" | "completed" => Some(Self::Completed),
            "failed" | "error" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Queued and running jobs are active; everything else is terminal
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step counter of a multi-stage job
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub step: u32,
    pub total_steps: u32,
    /// Always within `[0, 1]`
    pub ratio: f64,
}

impl JobProgress {
    /// Builds a progress value, clamping `ratio` into `[0, 1]`
    ///
    /// A missing or non-finite ratio is derived from `step / total_steps`.
    pub fn new(step: u32, total_steps: u32, ratio: Option<f64>) -> Self {
        let derived = if total_steps > 0 {
            f64::from(step) / f64::from(total_steps)
        } else {
            0.0
        };
        let ratio = ratio.filter(|r| r.is_finite()).unwrap_or(derived);
        Self {
            step,
            total_steps,
            ratio: ratio.clamp(0.0, 1.0),
        }
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new(0, 0, None)
    }
}

/// Discriminant of [`JobKind`], used to route frames and track selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKindTag {
    ResearchBrew,
    ComponentTestRun,
}

impl JobKindTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResearchBrew => "research_brew",
            Self::ComponentTestRun => "component_test_run",
        }
    }
}

/// Details of a multi-video research brew
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrewDetails {
    pub topic: String,
    pub stage: String,
    pub run_id: String,
    pub private_run: bool,
    pub is_public: bool,
    pub progress_detail: String,
    pub llm_backend: String,
    pub current_index: u32,
    pub total_videos: u32,
    pub error: String,
    pub report_text: String,
}

/// Details of a component test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRunDetails {
    pub component: String,
    pub component_label: String,
    pub summary: String,
    pub current_test: String,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    pub error: String,
}

/// Kind-specific part of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    ResearchBrew(BrewDetails),
    ComponentTestRun(TestRunDetails),
}

impl JobKind {
    pub fn tag(&self) -> JobKindTag {
        match self {
            Self::ResearchBrew(_) => JobKindTag::ResearchBrew,
            Self::ComponentTestRun(_) => JobKindTag::ComponentTestRun,
        }
    }
}

/// Snapshot of one server job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: String,
    kind: JobKind,
    status: JobStatus,
    progress: JobProgress,
    config: Map<String, Value>,
    updated_at: DateTime<Utc>,
    last_event_type: String,
}

impl Job {
    /// Normalizes a raw server snapshot of the given kind
    ///
    /// Accepts both `job_id` and `id`. Component test runs that carry no
    /// explicit `progress` derive it from their `metrics` counters.
    pub fn from_snapshot(tag: JobKindTag, raw: &Value) -> Result<Self, NormalizeError> {
        let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;

        let id = str_field(obj, "job_id");
        let id = if id.is_empty() { str_field(obj, "id") } else { id };
        if id.is_empty() {
            return Err(NormalizeError::MissingField("job_id"));
        }

        let raw_status = str_field(obj, "status");
        let status =
            JobStatus::parse(&raw_status).ok_or_else(|| NormalizeError::InvalidValue {
                field: "status",
                value: raw_status.clone(),
            })?;

        let progress = match obj.get("progress").and_then(Value::as_object) {
            Some(p) if !p.is_empty() => JobProgress::new(
                u32_field(p, "step"),
                first_u32(p, &["total_steps", "totalSteps"]),
                p.get("ratio").and_then(Value::as_f64),
            ),
            _ => metrics_progress(obj),
        };

        let updated_at = ["updated_at", "created_at"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(Value::as_str))
            .find_map(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let kind = match tag {
            JobKindTag::ResearchBrew => JobKind::ResearchBrew(BrewDetails {
                topic: str_field(obj, "topic"),
                stage: str_field(obj, "stage"),
                run_id: str_field(obj, "run_id"),
                private_run: bool_field(obj, "private_run"),
                is_public: bool_field(obj, "is_public"),
                progress_detail: str_field(obj, "progress_detail"),
                llm_backend: str_field(obj, "llm_backend"),
                current_index: u32_field(obj, "current_index"),
                total_videos: u32_field(obj, "total_videos"),
                error: str_field(obj, "error"),
                report_text: str_field(obj, "report_text"),
            }),
            JobKindTag::ComponentTestRun => {
                let metrics = obj.get("metrics").and_then(Value::as_object);
                let count = |key: &str| metrics.map(|m| u32_field(m, key)).unwrap_or(0);
                JobKind::ComponentTestRun(TestRunDetails {
                    component: str_field(obj, "component"),
                    component_label: str_field(obj, "component_label"),
                    summary: str_field(obj, "summary"),
                    current_test: str_field(obj, "current_test"),
                    passed: count("passed"),
                    failed: count("failed"),
                    errors: count("errors"),
                    skipped: count("skipped"),
                    error: str_field(obj, "error"),
                })
            }
        };

        Ok(Self {
            id,
            kind,
            status,
            progress,
            config: obj
                .get("config")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            updated_at,
            last_event_type: str_field(obj, "last_event_type"),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn tag(&self) -> JobKindTag {
        self.kind.tag()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> JobProgress {
        self.progress
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_event_type(&self) -> &str {
        &self.last_event_type
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Human readable stage derived from the last progress event
    pub fn stage_label(&self) -> &'static str {
        match self.last_event_type.as_str() {
            "started" => "Starting",
            "queries_ready" => "Queries ready",
            "search_query_started" | "search_query_processed" => "Searching",
            "candidates_ready" => "Candidates ready",
            "processing_video" | "video_processed" => "Reviewing videos",
            "comparing" => "Comparing",
            "completed" => "Completed",
            "failed" => "Failed",
            _ => match self.status {
                JobStatus::Queued => "Queued",
                JobStatus::Running => "Running",
                JobStatus::Completed => "Completed",
                JobStatus::Failed => "Failed",
            },
        }
    }
}

fn metrics_progress(obj: &Map<String, Value>) -> JobProgress {
    match obj.get("metrics").and_then(Value::as_object) {
        Some(m) => JobProgress::new(u32_field(m, "completed"), u32_field(m, "total"), None),
        None => JobProgress::default(),
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn u32_field(obj: &Map<String, Value>, key: &str) -> u32 {
    obj.get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .map(|n| n.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

fn first_u32(obj: &Map<String, Value>, keys: &[&str]) -> u32 {
    keys.iter()
        .find(|k| obj.contains_key(**k))
        .map(|k| u32_field(obj, k))
        .unwrap_or(0)
}
