//! Job-related API endpoints

use serde_json::Value;
use tracing::warn;
use tubesync_core::domain::job::{Job, JobKindTag};
use tubesync_core::dto::job::{StartBrewRequest, StartTestRunRequest};
use tubesync_core::dto::runtime::{RuntimeInfo, RuntimeResponse};
use tubesync_core::dto::{ItemResponse, ItemsResponse};

use crate::BackendClient;
use crate::error::{ClientError, Result};

/// Endpoint family of each job kind
fn endpoints(kind: JobKindTag) -> (&'static str, &'static str, &'static str) {
    match kind {
        JobKindTag::ResearchBrew => (
            "/api/knowledge_juice/jobs",
            "/api/knowledge_juice/job",
            "/api/knowledge_juice/start",
        ),
        JobKindTag::ComponentTestRun => (
            "/api/component_tests/jobs",
            "/api/component_tests/job",
            "/api/component_tests/start",
        ),
    }
}

impl BackendClient {
    // =============================================================================
    // Runtime
    // =============================================================================

    /// Fetch the push channel advertisement
    pub async fn runtime(&self) -> Result<RuntimeInfo> {
        let response = self.client.get(self.url("/api/runtime")).send().await?;
        let body: RuntimeResponse = self.handle_response(response).await?;
        Ok(body.runtime)
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// List jobs of one kind, newest first
    ///
    /// Snapshots that fail normalization are skipped.
    ///
    /// # Arguments
    /// * `kind` - Which job family to list
    /// * `active_only` - Only queued and running jobs
    pub async fn list_jobs(&self, kind: JobKindTag, active_only: bool) -> Result<Vec<Job>> {
        let (list_path, _, _) = endpoints(kind);
        let response = self
            .client
            .get(self.url(list_path))
            .query(&[("active_only", if active_only { "1" } else { "0" })])
            .send()
            .await?;

        let body: ItemsResponse<Value> = self.handle_response(response).await?;
        Ok(body
            .items
            .iter()
            .filter_map(|raw| match Job::from_snapshot(kind, raw) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(kind = kind.as_str(), "Skipping malformed job snapshot: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Get one job by ID
    pub async fn get_job(&self, kind: JobKindTag, job_id: &str) -> Result<Job> {
        let (_, get_path, _) = endpoints(kind);
        let response = self
            .client
            .get(self.url(get_path))
            .query(&[("job_id", job_id)])
            .send()
            .await?;

        let body: ItemResponse<Value> = self.handle_response(response).await?;
        normalize(kind, &body.item)
    }

    /// Start a research brew
    ///
    /// # Returns
    /// The initial job snapshot
    pub async fn start_brew(&self, req: &StartBrewRequest) -> Result<Job> {
        if req.topic.trim().is_empty() {
            return Err(ClientError::InvalidRequest("topic is required".into()));
        }
        let (_, _, start_path) = endpoints(JobKindTag::ResearchBrew);
        let response = self.client.post(self.url(start_path)).json(req).send().await?;

        let body: ItemResponse<Value> = self.handle_response(response).await?;
        normalize(JobKindTag::ResearchBrew, &body.item)
    }

    /// Start a component test run
    ///
    /// The backend returns the already active run for the component instead of
    /// starting a second one.
    pub async fn start_test_run(&self, req: &StartTestRunRequest) -> Result<Job> {
        let (_, _, start_path) = endpoints(JobKindTag::ComponentTestRun);
        let response = self.client.post(self.url(start_path)).json(req).send().await?;

        let body: ItemResponse<Value> = self.handle_response(response).await?;
        normalize(JobKindTag::ComponentTestRun, &body.item)
    }
}

fn normalize(kind: JobKindTag, raw: &Value) -> Result<Job> {
    Job::from_snapshot(kind, raw)
        .map_err(|e| ClientError::ParseError(format!("Invalid job snapshot: {}", e)))
}
