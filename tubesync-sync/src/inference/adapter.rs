//! Inference adapter
//!
//! Owns the provider chain and the memoized session, and turns transcripts
//! into analyses and answers: long transcripts are analyzed window by window
//! and merged, and answers that report missing context get one more pass
//! over evidence-ranked context.

use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::InferenceConfig;
use super::chunk::{self, ChunkConfig, Scoring};
use super::provider::{InferenceProvider, InferenceSession, ModelRuntimeProvider, NativeApiProvider};

/// Progress reported while inference runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceStatus {
    Probing { provider: String },
    Initializing { provider: String, detail: String },
    Ready { backend: String },
    /// Window `index` of `total`, 1-based
    Window { index: usize, total: usize },
    Merging { parts: usize },
    EvidencePass,
}

/// Callback receiving [`InferenceStatus`] updates
pub type StatusSink<'a> = &'a (dyn Fn(InferenceStatus) + Send + Sync);

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("No on-device inference capability is available")]
    NoCapability,

    #[error("{provider} failed to initialize: {message}")]
    Init { provider: String, message: String },

    #[error("{provider}: no model candidate could be prepared ({})", errors.join("; "))]
    AllCandidatesFailed { provider: String, errors: Vec<String> },

    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("Inference returned no text")]
    EmptyResult,
}

/// Result of an inference run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceOutput {
    pub text: String,
    /// Label of the session that produced the text
    pub backend: String,
    /// Number of windows the input was analyzed in
    pub windows: usize,
    /// `true` if the answer came from the evidence pass
    pub evidence_pass: bool,
}

const ANALYZE_SYSTEM: &str = "You summarize video transcripts. Use only the transcript. \
     Write concise notes: the main points as bullet lines, then any concrete numbers, \
     names and steps mentioned.";

const MERGE_SYSTEM: &str = "You merge partial notes about one video into a single set of notes. \
     Remove repetition, keep every concrete number, name and step, and keep the bullet format.";

const ASK_SYSTEM: &str = "You are a strict transcript-grounded assistant. Use only the provided \
     transcript content and no outside knowledge. If the transcript does not answer the \
     question, reply with the single word: insufficient. Keep the answer short.";

const EVIDENCE_SYSTEM: &str = "You are a strict transcript-grounded assistant. The lines below were \
     picked as the strongest evidence for the question. Answer from them only, quoting the \
     deciding line. If they still do not answer the question, reply: insufficient.";

fn analyze_prompt(title: &str, window: &str, index: usize, total: usize) -> String {
    if total == 1 {
        format!("Title: {title}\n\nTranscript:\n{window}")
    } else {
        format!("Title: {title}\nPart {index} of {total}\n\nTranscript part:\n{window}")
    }
}

fn merge_prompt(title: &str, partials: &[String]) -> String {
    let mut prompt = format!("Title: {title}\n\n");
    for (i, partial) in partials.iter().enumerate() {
        prompt.push_str(&format!("Notes for part {}:\n{}\n\n", i + 1, partial.trim()));
    }
    prompt.push_str("Merged notes:");
    prompt
}

fn ask_prompt(question: &str, context: &str) -> String {
    format!("Transcript content:\n{context}\n\nQuestion: {question}")
}

/// Provider chain with a memoized session
pub struct InferenceAdapter {
    providers: Vec<Arc<dyn InferenceProvider>>,
    session: OnceCell<Arc<dyn InferenceSession>>,
    chunk: ChunkConfig,
    context_chars: usize,
}

impl InferenceAdapter {
    pub fn new(providers: Vec<Arc<dyn InferenceProvider>>, chunk: ChunkConfig, context_chars: usize) -> Self {
        Self {
            providers,
            session: OnceCell::new(),
            chunk,
            context_chars,
        }
    }

    /// Builds the chain from settings: native endpoint first, then the runtime
    pub fn from_config(config: &InferenceConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        let mut providers: Vec<Arc<dyn InferenceProvider>> = Vec::new();
        if let Some(url) = &config.native_url {
            providers.push(Arc::new(NativeApiProvider::new(url.clone(), client.clone())));
        }
        if let Some(url) = &config.runtime_url {
            providers.push(Arc::new(ModelRuntimeProvider::new(
                url.clone(),
                config.model_candidates.clone(),
                client,
            )));
        }

        Self::new(providers, config.chunk, config.context_chars)
    }

    /// Label of the initialized session, if any
    pub fn backend(&self) -> Option<String> {
        self.session.get().map(|s| s.label())
    }

    /// Returns the session, initializing it on first use
    ///
    /// Concurrent callers share one initialization. A failed initialization
    /// is not memoized; the next call probes again.
    pub async fn session(&self, on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        let session = self
            .session
            .get_or_try_init(|| self.init_first(on_status))
            .await?;
        Ok(Arc::clone(session))
    }

    async fn init_first(&self, on_status: StatusSink<'_>) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        let mut last_error = None;

        for provider in &self.providers {
            on_status(InferenceStatus::Probing {
                provider: provider.name().to_string(),
            });
            if !provider.available().await {
                debug!(provider = provider.name(), "Inference provider unavailable");
                continue;
            }

            match provider.init(on_status).await {
                Ok(session) => {
                    let backend = session.label();
                    info!(backend = %backend, "Inference session ready");
                    on_status(InferenceStatus::Ready { backend });
                    return Ok(session);
                }
                Err(e) => {
                    warn!(provider = provider.name(), "Inference provider failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(InferenceError::NoCapability))
    }

    /// Runs one prompt as-is
    pub async fn run(&self, system: &str, user: &str, on_status: StatusSink<'_>) -> Result<InferenceOutput, InferenceError> {
        let session = self.session(on_status).await?;
        let text = session.infer(system, user).await?;
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyResult);
        }
        Ok(InferenceOutput {
            text,
            backend: session.label(),
            windows: 1,
            evidence_pass: false,
        })
    }

    /// Produces notes for a transcript
    ///
    /// Transcripts over the chunking trigger are split into windows, each
    /// window is analyzed separately, and the non-empty partials are merged
    /// in one more call. A single usable partial is returned verbatim.
    pub async fn analyze(&self, title: &str, transcript: &str, on_status: StatusSink<'_>) -> Result<InferenceOutput, InferenceError> {
        let session = self.session(on_status).await?;

        let windows = if chunk::needs_chunking(transcript, &self.chunk) {
            chunk::split_windows(transcript, &self.chunk)
        } else {
            vec![transcript.trim().to_string()]
        };
        let total = windows.len();

        let mut partials = Vec::new();
        for (i, window) in windows.iter().enumerate() {
            on_status(InferenceStatus::Window { index: i + 1, total });
            let partial = session
                .infer(ANALYZE_SYSTEM, &analyze_prompt(title, window, i + 1, total))
                .await?;
            if partial.trim().is_empty() {
                debug!(window = i + 1, total, "Window produced no notes");
                continue;
            }
            partials.push(partial);
        }

        let text = match partials.len() {
            0 => return Err(InferenceError::EmptyResult),
            1 => partials.remove(0),
            parts => {
                on_status(InferenceStatus::Merging { parts });
                let merged = session.infer(MERGE_SYSTEM, &merge_prompt(title, &partials)).await?;
                let merged = merged.trim();
                if merged.is_empty() {
                    warn!(parts, "Merge produced no text, keeping partial notes");
                    partials.iter().map(|p| p.trim()).collect::<Vec<_>>().join("\n\n")
                } else {
                    merged.to_string()
                }
            }
        };

        Ok(InferenceOutput {
            text,
            backend: session.label(),
            windows: total,
            evidence_pass: false,
        })
    }

    /// Answers a question from the transcript
    ///
    /// If the first answer reports insufficient context, the question is
    /// asked once more over evidence-ranked context.
    pub async fn ask(&self, question: &str, transcript: &str, on_status: StatusSink<'_>) -> Result<InferenceOutput, InferenceError> {
        let session = self.session(on_status).await?;

        let context = chunk::select_context(transcript, question, Scoring::Relevance, self.context_chars);
        let first = session.infer(ASK_SYSTEM, &ask_prompt(question, &context)).await?;
        let first = first.trim().to_string();

        if !first.is_empty() && !chunk::is_insufficient(&first) {
            return Ok(InferenceOutput {
                text: first,
                backend: session.label(),
                windows: 1,
                evidence_pass: false,
            });
        }

        on_status(InferenceStatus::EvidencePass);
        let evidence = chunk::select_context(transcript, question, Scoring::Evidence, self.context_chars);
        let second = session.infer(EVIDENCE_SYSTEM, &ask_prompt(question, &evidence)).await?;
        let second = second.trim().to_string();

        let text = match (second.is_empty(), first.is_empty()) {
            (false, _) => second,
            (true, false) => first,
            (true, true) => return Err(InferenceError::EmptyResult),
        };

        Ok(InferenceOutput {
            text,
            backend: session.label(),
            windows: 1,
            evidence_pass: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;
    use std::sync::atomic::Ordering;

    fn quiet() -> impl Fn(InferenceStatus) + Send + Sync {
        |_| {}
    }

    fn long_transcript() -> String {
        let line = "pull the shot for twenty eight seconds and taste it\n";
        line.repeat(22_000 / line.len() + 1).chars().take(22_000).collect()
    }

    fn adapter(providers: Vec<Arc<FakeProvider>>) -> InferenceAdapter {
        let chain = providers
            .into_iter()
            .map(|p| p as Arc<dyn InferenceProvider>)
            .collect();
        InferenceAdapter::new(chain, ChunkConfig::default(), 4_000)
    }

    fn echo_provider() -> Arc<FakeProvider> {
        Arc::new(FakeProvider::new(
            "runtime",
            Arc::new(|system: &str, _user: &str| {
                if system == MERGE_SYSTEM {
                    "merged notes".to_string()
                } else {
                    "partial notes".to_string()
                }
            }),
        ))
    }

    #[tokio::test]
    async fn test_long_transcript_is_windowed_and_merged() {
        let provider = echo_provider();
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter.analyze("Espresso", &long_transcript(), &quiet()).await.unwrap();

        assert!(output.windows >= 2 && output.windows <= 4);
        assert_eq!(output.text, "merged notes");
        assert_eq!(output.backend, "runtime:fake");
        // One call per window plus exactly one merge
        assert_eq!(provider.call_count(), output.windows + 1);
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|(s, _)| s == MERGE_SYSTEM).count(), 1);
    }

    #[tokio::test]
    async fn test_short_transcript_returns_partial_verbatim() {
        let provider = echo_provider();
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter.analyze("Espresso", "short transcript", &quiet()).await.unwrap();

        assert_eq!(output.windows, 1);
        assert_eq!(output.text, "partial notes");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_usable_partial_skips_merge() {
        let provider = Arc::new(FakeProvider::new(
            "runtime",
            Arc::new(|_system: &str, user: &str| {
                if user.contains("Part 1 of") {
                    "only part one".to_string()
                } else {
                    String::new()
                }
            }),
        ));
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter.analyze("Espresso", &long_transcript(), &quiet()).await.unwrap();

        assert_eq!(output.text, "only part one");
        assert_eq!(provider.call_count(), output.windows);
    }

    #[tokio::test]
    async fn test_sole_partial_keeps_its_whitespace() {
        let provider = Arc::new(FakeProvider::new(
            "runtime",
            Arc::new(|_: &str, _: &str| "\n- grind finer\n- tamp evenly\n".to_string()),
        ));
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter.analyze("Espresso", "short transcript", &quiet()).await.unwrap();

        assert_eq!(output.text, "\n- grind finer\n- tamp evenly\n");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_partials_is_empty_result() {
        let provider = Arc::new(FakeProvider::new("runtime", Arc::new(|_: &str, _: &str| "  ".to_string())));
        let adapter = adapter(vec![provider]);

        let err = adapter.analyze("Espresso", &long_transcript(), &quiet()).await.unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResult));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_init() {
        let provider = echo_provider();
        let adapter = adapter(vec![provider.clone()]);
        let sink = quiet();

        let (a, b, c) = tokio::join!(
            adapter.session(&sink),
            adapter.session(&sink),
            adapter.analyze("Espresso", "short", &sink),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(provider.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.backend().as_deref(), Some("runtime:fake"));
    }

    #[tokio::test]
    async fn test_chain_skips_unavailable_and_failing_providers() {
        let unavailable = Arc::new(FakeProvider::unavailable("native"));
        let failing = Arc::new(FakeProvider::failing("broken"));
        let working = echo_provider();
        let adapter = adapter(vec![unavailable.clone(), failing.clone(), working.clone()]);

        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |status: InferenceStatus| seen.lock().unwrap().push(status);
        let session = adapter.session(&sink).await.unwrap();

        assert_eq!(session.label(), "runtime:fake");
        assert_eq!(unavailable.init_calls.load(Ordering::SeqCst), 0);
        assert_eq!(failing.init_calls.load(Ordering::SeqCst), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.last(),
            Some(&InferenceStatus::Ready {
                backend: "runtime:fake".into()
            })
        );
    }

    #[tokio::test]
    async fn test_no_available_provider_is_no_capability() {
        let adapter = adapter(vec![Arc::new(FakeProvider::unavailable("native"))]);
        let err = adapter.session(&quiet()).await.err().unwrap();
        assert!(matches!(err, InferenceError::NoCapability));
    }

    #[tokio::test]
    async fn test_failed_init_surfaces_error_and_is_retried() {
        let failing = Arc::new(FakeProvider::failing("runtime"));
        let adapter = adapter(vec![failing.clone()]);

        let err = adapter.session(&quiet()).await.err().unwrap();
        assert!(matches!(err, InferenceError::Init { .. }));
        assert!(adapter.session(&quiet()).await.is_err());
        assert_eq!(failing.init_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ask_runs_evidence_pass_on_insufficient() {
        let provider = Arc::new(FakeProvider::new(
            "runtime",
            Arc::new(|system: &str, _user: &str| {
                if system == EVIDENCE_SYSTEM {
                    "About 15 kg of tamper pressure".to_string()
                } else {
                    "insufficient".to_string()
                }
            }),
        ));
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter
            .ask("How much tamper pressure?", "The tamper pressure is 15 kg\n", &quiet())
            .await
            .unwrap();

        assert!(output.evidence_pass);
        assert_eq!(output.text, "About 15 kg of tamper pressure");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_ask_answered_first_time() {
        let provider = Arc::new(FakeProvider::new("runtime", Arc::new(|_: &str, _: &str| "18 grams".to_string())));
        let adapter = adapter(vec![provider.clone()]);

        let output = adapter.ask("How many grams?", "Use 18 grams\n", &quiet()).await.unwrap();
        assert!(!output.evidence_pass);
        assert_eq!(output.text, "18 grams");
        assert_eq!(provider.call_count(), 1);
    }
}
