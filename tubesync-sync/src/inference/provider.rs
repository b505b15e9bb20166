//! Inference providers
//!
//! Every provider exposes the same shape: a cheap availability probe, a
//! possibly slow initialization that yields a session, and inference on that
//! session. The adapter walks providers in priority order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::adapter::{InferenceError, InferenceStatus, StatusSink};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const TEMPERATURE: f64 = 0.2;
const KEEP_ALIVE: &str = "30m";

/// A capability that can run inference on this device
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap probe; must not download or load anything
    async fn available(&self) -> bool;

    /// Prepares a session, reporting slow steps through `on_status`
    async fn init(&self, on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError>;
}

/// An initialized provider ready to answer prompts
#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Backend label recorded next to stored results (e.g. "runtime:llama3.2:3b")
    fn label(&self) -> String;

    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError>;
}

fn request_error(provider: &str, e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Request {
        provider: provider.to_string(),
        message: e.to_string(),
    }
}

async fn post_json(client: &Client, provider: &str, url: &str, body: &Value) -> Result<Value, InferenceError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| request_error(provider, e))?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| request_error(provider, format!("invalid response body: {e}")))?;

    if let Some(error) = payload.get("error").and_then(Value::as_str) {
        return Err(request_error(provider, error));
    }
    if !status.is_success() {
        return Err(request_error(provider, format!("HTTP {}", status.as_u16())));
    }
    Ok(payload)
}

async fn probe(client: &Client, url: &str) -> bool {
    match client.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!(url, "Inference probe failed: {}", e);
            false
        }
    }
}

// =============================================================================
// Native structured endpoint
// =============================================================================

/// Same-device inference service with a chat-completions style API
pub struct NativeApiProvider {
    base_url: String,
    client: Client,
}

impl NativeApiProvider {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl InferenceProvider for NativeApiProvider {
    fn name(&self) -> &str {
        "native"
    }

    async fn available(&self) -> bool {
        probe(&self.client, &format!("{}/health", self.base_url)).await
    }

    async fn init(&self, on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        on_status(InferenceStatus::Initializing {
            provider: self.name().to_string(),
            detail: self.base_url.clone(),
        });
        Ok(Arc::new(NativeSession {
            url: format!("{}/v1/chat/completions", self.base_url),
            client: self.client.clone(),
        }))
    }
}

struct NativeSession {
    url: String,
    client: Client,
}

#[async_trait]
impl InferenceSession for NativeSession {
    fn label(&self) -> String {
        "native".to_string()
    }

    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let body = json!({
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": TEMPERATURE,
            "stream": false,
        });
        let payload = post_json(&self.client, "native", &self.url, &body).await?;
        Ok(payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

// =============================================================================
// Local model runtime
// =============================================================================

/// Local model runtime speaking the Ollama HTTP API
///
/// Candidates are tried in order; the first model that can be pulled wins.
pub struct ModelRuntimeProvider {
    base_url: String,
    candidates: Vec<String>,
    client: Client,
}

impl ModelRuntimeProvider {
    pub fn new(base_url: impl Into<String>, candidates: Vec<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            candidates,
            client,
        }
    }

    async fn prepare(&self, model: &str) -> Result<(), InferenceError> {
        let body = json!({"model": model, "stream": false});
        post_json(&self.client, self.name(), &format!("{}/api/pull", self.base_url), &body).await?;
        Ok(())
    }
}

#[async_trait]
impl InferenceProvider for ModelRuntimeProvider {
    fn name(&self) -> &str {
        "runtime"
    }

    async fn available(&self) -> bool {
        !self.candidates.is_empty() && probe(&self.client, &format!("{}/api/tags", self.base_url)).await
    }

    async fn init(&self, on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        let mut errors = Vec::new();

        for model in &self.candidates {
            on_status(InferenceStatus::Initializing {
                provider: self.name().to_string(),
                detail: model.clone(),
            });

            match self.prepare(model).await {
                Ok(()) => {
                    info!(model = %model, "Local model ready");
                    return Ok(Arc::new(RuntimeSession {
                        url: format!("{}/api/chat", self.base_url),
                        model: model.clone(),
                        client: self.client.clone(),
                    }));
                }
                Err(e) => {
                    warn!(model = %model, "Model candidate failed: {}", e);
                    errors.push(format!("{model}: {e}"));
                }
            }
        }

        Err(InferenceError::AllCandidatesFailed {
            provider: self.name().to_string(),
            errors,
        })
    }
}

struct RuntimeSession {
    url: String,
    model: String,
    client: Client,
}

#[async_trait]
impl InferenceSession for RuntimeSession {
    fn label(&self) -> String {
        format!("runtime:{}", self.model)
    }

    async fn infer(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "options": {"temperature": TEMPERATURE},
            "keep_alive": KEEP_ALIVE,
        });
        let payload = post_json(&self.client, "runtime", &self.url, &body).await?;
        Ok(payload
            .pointer("/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        let native = NativeApiProvider::new("http://127.0.0.1:8090/", Client::new());
        assert_eq!(native.name(), "native");
        assert_eq!(native.base_url, "http://127.0.0.1:8090");

        let runtime = ModelRuntimeProvider::new("http://127.0.0.1:11434", vec!["llama3.2:3b".into()], Client::new());
        assert_eq!(runtime.name(), "runtime");
    }

    #[tokio::test]
    async fn test_runtime_without_candidates_is_unavailable() {
        let runtime = ModelRuntimeProvider::new("http://127.0.0.1:9", Vec::new(), Client::new());
        assert!(!runtime.available().await);
    }

    #[tokio::test]
    async fn test_runtime_init_reports_every_failed_candidate() {
        // Port 9 (discard) refuses connections on test machines
        let runtime = ModelRuntimeProvider::new(
            "http://127.0.0.1:9",
            vec!["first:1b".into(), "second:1b".into()],
            Client::new(),
        );
        let seen = std::sync::Mutex::new(Vec::new());
        let on_status = |status: InferenceStatus| {
            if let InferenceStatus::Initializing { detail, .. } = status {
                seen.lock().unwrap().push(detail);
            }
        };

        let err = match runtime.init(&on_status).await {
            Err(e) => e,
            Ok(_) => panic!("init should fail without a runtime"),
        };
        match err {
            InferenceError::AllCandidatesFailed { errors, .. } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*seen.lock().unwrap(), vec!["first:1b", "second:1b"]);
    }
}
