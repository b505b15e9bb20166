//! Session configuration
//!
//! Every timing constant the sync layer depends on lives here so deployments
//! can tune it. Defaults follow the behaviour of the web client this crate
//! replaces.

use std::path::PathBuf;
use std::time::Duration;

use crate::inference::{ChunkConfig, InferenceConfig};

/// Sync session configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend base URL (e.g., "http://127.0.0.1:8088")
    pub backend_url: String,

    /// Explicit push channel URL; derived from `/api/runtime` when unset
    pub ws_url: Option<String>,

    /// Interval of the pull loop used when push is unavailable
    pub poll_interval: Duration,

    /// Delay before the single reconnect attempt after a push disconnect
    pub reconnect_delay: Duration,

    /// Directory of the persistent key/value store
    pub state_dir: PathBuf,

    /// Maximum number of locally persisted recent downloads
    pub recent_cap: usize,

    /// Pending saves idle for longer than this read as failed
    pub stale_after: Duration,

    /// Number of polls a save monitor performs before giving up
    pub monitor_max_iterations: u32,

    /// Delay between two save monitor polls
    pub monitor_delay: Duration,

    /// Ignore job snapshots older than the stored one
    pub reject_stale_job_updates: bool,

    /// On-device inference settings
    pub inference: InferenceConfig,
}

impl SyncConfig {
    /// Creates a new configuration with defaults
    pub fn new(backend_url: String) -> Self {
        Self {
            backend_url,
            ws_url: None,
            poll_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(3),
            state_dir: PathBuf::from(".tubesync"),
            recent_cap: 10,
            stale_after: Duration::from_secs(20 * 60),
            monitor_max_iterations: 90,
            monitor_delay: Duration::from_secs(4),
            reject_stale_job_updates: false,
            inference: InferenceConfig::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - TUBESYNC_BACKEND_URL (optional, default: http://127.0.0.1:8088)
    /// - TUBESYNC_WS_URL (optional)
    /// - TUBESYNC_POLL_INTERVAL (optional, seconds, default: 5)
    /// - TUBESYNC_RECONNECT_DELAY (optional, seconds, default: 3)
    /// - TUBESYNC_STATE_DIR (optional, default: .tubesync)
    /// - TUBESYNC_RECENT_CAP (optional, default: 10)
    /// - TUBESYNC_STALE_AFTER (optional, seconds, default: 1200)
    /// - TUBESYNC_MONITOR_ITERATIONS (optional, default: 90)
    /// - TUBESYNC_MONITOR_DELAY_MS (optional, default: 4000)
    /// - TUBESYNC_REJECT_STALE_JOB_UPDATES (optional, default: false)
    /// - TUBESYNC_NATIVE_INFERENCE_URL (optional)
    /// - TUBESYNC_MODEL_RUNTIME_URL (optional)
    /// - TUBESYNC_MODEL_CANDIDATES (optional, comma separated)
    pub fn from_env() -> Self {
        let mut config = Self::new(
            env_string("TUBESYNC_BACKEND_URL").unwrap_or_else(|| "http://127.0.0.1:8088".into()),
        );

        config.ws_url = env_string("TUBESYNC_WS_URL");
        if let Some(secs) = env_parse::<u64>("TUBESYNC_POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("TUBESYNC_RECONNECT_DELAY") {
            config.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(dir) = env_string("TUBESYNC_STATE_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(cap) = env_parse::<usize>("TUBESYNC_RECENT_CAP") {
            config.recent_cap = cap;
        }
        if let Some(secs) = env_parse::<u64>("TUBESYNC_STALE_AFTER") {
            config.stale_after = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("TUBESYNC_MONITOR_ITERATIONS") {
            config.monitor_max_iterations = n;
        }
        if let Some(ms) = env_parse::<u64>("TUBESYNC_MONITOR_DELAY_MS") {
            config.monitor_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = env_string("TUBESYNC_REJECT_STALE_JOB_UPDATES") {
            config.reject_stale_job_updates = matches!(flag.as_str(), "1" | "true" | "yes" | "on");
        }

        config.inference.native_url = env_string("TUBESYNC_NATIVE_INFERENCE_URL");
        if let Some(url) = env_string("TUBESYNC_MODEL_RUNTIME_URL") {
            config.inference.runtime_url = Some(url);
        }
        if let Some(list) = env_string("TUBESYNC_MODEL_CANDIDATES") {
            let candidates: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !candidates.is_empty() {
                config.inference.model_candidates = candidates;
            }
        }

        config
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err("backend_url must start with http:// or https://".into());
        }

        if let Some(ws) = &self.ws_url {
            if !ws.starts_with("ws://") && !ws.starts_with("wss://") {
                return Err("ws_url must start with ws:// or wss://".into());
            }
        }

        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".into());
        }

        if self.recent_cap == 0 {
            return Err("recent_cap must be greater than 0".into());
        }

        if self.monitor_max_iterations == 0 {
            return Err("monitor_max_iterations must be greater than 0".into());
        }

        self.inference.chunk.validate()?;

        Ok(())
    }

    /// Builder-style override of the state directory
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Builder-style override of the chunking parameters
    pub fn with_chunking(mut self, chunk: ChunkConfig) -> Self {
        self.inference.chunk = chunk;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8088".to_string())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stale_after, Duration::from_secs(1200));
        assert_eq!(config.recent_cap, 10);
        assert!(!config.reject_stale_job_updates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.backend_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.backend_url = "http://127.0.0.1:8088".to_string();

        config.ws_url = Some("http://127.0.0.1:8765/ws".to_string());
        assert!(config.validate().is_err());
        config.ws_url = Some("ws://127.0.0.1:8765/ws".to_string());
        assert!(config.validate().is_ok());

        config.recent_cap = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_state_dir() {
        let config = SyncConfig::default().with_state_dir("/tmp/tubesync-test");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/tubesync-test"));
    }
}
