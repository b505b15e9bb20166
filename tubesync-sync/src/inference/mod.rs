//! On-device inference
//!
//! Local-mode notes run against whatever inference capability this device
//! has. Providers are probed in priority order and the first one that
//! initializes is memoized for the rest of the session.

pub mod adapter;
pub mod chunk;
pub mod provider;

use std::time::Duration;

pub use adapter::{InferenceAdapter, InferenceError, InferenceOutput, InferenceStatus, StatusSink};
pub use chunk::{ChunkConfig, Scoring};
pub use provider::{InferenceProvider, InferenceSession, ModelRuntimeProvider, NativeApiProvider};

/// Inference settings
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// Native structured endpoint, tried first when set
    pub native_url: Option<String>,
    /// Local model runtime base URL
    pub runtime_url: Option<String>,
    /// Runtime models in preference order
    pub model_candidates: Vec<String>,
    pub chunk: ChunkConfig,
    /// Budget for the question context passed to `ask`
    pub context_chars: usize,
    pub request_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            native_url: None,
            runtime_url: Some("http://127.0.0.1:11434".to_string()),
            model_candidates: vec![
                "llama3.2:3b".to_string(),
                "qwen2.5:3b".to_string(),
                "gemma2:2b".to_string(),
            ],
            chunk: ChunkConfig::default(),
            context_chars: 12_000,
            request_timeout: Duration::from_secs(180),
        }
    }
}
