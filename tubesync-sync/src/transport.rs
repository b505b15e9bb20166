//! Live-update transport
//!
//! Keeps the [`JobRegistry`] fed with job snapshots. When the backend
//! advertises a push channel the transport connects to it, replays the
//! `hello` snapshot and applies every job frame. When push is disabled or
//! cannot be established it falls back to a pull loop. Both paths end in the
//! same registry upsert, so consumers never know which one is active.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tubesync_core::domain::job::JobKindTag;
use tubesync_core::dto::push::PushFrame;
use tubesync_core::dto::runtime::RuntimeInfo;
use url::Url;

use crate::config::SyncConfig;
use crate::events::{EventBus, SyncEvent, TransportStatus};
use crate::registry::JobRegistry;
use crate::repository::BackendRepository;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOB_KINDS: [JobKindTag; 2] = [JobKindTag::ResearchBrew, JobKindTag::ComponentTestRun];

/// Transport settings taken from [`SyncConfig`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub backend_url: String,
    pub ws_url: Option<String>,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl From<&SyncConfig> for TransportConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            backend_url: config.backend_url.clone(),
            ws_url: config.ws_url.clone(),
            poll_interval: config.poll_interval,
            reconnect_delay: config.reconnect_delay,
        }
    }
}

/// Push channel with pull fallback
pub struct TransportChannel {
    api: Arc<dyn BackendRepository>,
    registry: Arc<JobRegistry>,
    events: EventBus,
    config: TransportConfig,
}

impl TransportChannel {
    pub fn new(
        api: Arc<dyn BackendRepository>,
        registry: Arc<JobRegistry>,
        events: EventBus,
        config: TransportConfig,
    ) -> Self {
        Self {
            api,
            registry,
            events,
            config,
        }
    }

    /// Runs the transport until the task is aborted
    ///
    /// 1. One pull listing so the registry is populated immediately
    /// 2. Push session if the backend advertises one
    /// 3. After a disconnect: degraded status, one reconnect attempt after
    ///    `reconnect_delay`
    /// 4. Pull loop once push is unavailable
    pub async fn run(&self) {
        self.set_status(TransportStatus::Connecting);
        if let Err(e) = self.poll_once().await {
            warn!("Initial job listing failed: {}", e);
        }

        let Some(ws_url) = self.resolve_ws_url().await else {
            info!("Push channel not available, polling for job updates");
            return self.poll_loop().await;
        };

        let Some(mut stream) = self.connect(&ws_url).await else {
            return self.poll_loop().await;
        };

        loop {
            self.set_status(TransportStatus::Live);
            self.run_session(stream).await;

            self.set_status(TransportStatus::Degraded);
            tokio::time::sleep(self.config.reconnect_delay).await;

            match self.connect(&ws_url).await {
                Some(next) => stream = next,
                None => {
                    warn!("Push channel reconnect failed, switching to polling");
                    break;
                }
            }
        }

        self.poll_loop().await
    }

    /// Applies one text frame to the registry
    ///
    /// Malformed frames and snapshots are logged and dropped.
    ///
    /// # Returns
    /// Number of job snapshots that were applied
    pub fn handle_text(&self, text: &str) -> usize {
        let frame = match PushFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed push frame: {}", e);
                return 0;
            }
        };

        match frame {
            PushFrame::Hello {
                active_jobs,
                active_component_jobs,
            } => {
                let brews = self.apply_snapshots(JobKindTag::ResearchBrew, &active_jobs);
                let runs = self.apply_snapshots(JobKindTag::ComponentTestRun, &active_component_jobs);
                debug!(brews, runs, "Replayed hello snapshot");
                brews + runs
            }
            PushFrame::Job { kind, event, job } => {
                debug!(kind = kind.as_str(), ?event, "Job frame");
                self.apply_snapshots(kind, std::slice::from_ref(&job))
            }
            PushFrame::Ignored(frame_type) => {
                debug!(frame_type = %frame_type, "Ignoring push frame");
                0
            }
        }
    }

    fn apply_snapshots(&self, kind: JobKindTag, snapshots: &[serde_json::Value]) -> usize {
        snapshots
            .iter()
            .filter(|raw| match self.registry.upsert_raw(kind, raw) {
                Ok(_) => true,
                Err(e) => {
                    warn!(kind = kind.as_str(), "Dropping malformed job snapshot: {}", e);
                    false
                }
            })
            .count()
    }

    /// Pulls the full job listing of every kind
    pub async fn poll_once(&self) -> Result<(), tubesync_client::ClientError> {
        for kind in JOB_KINDS {
            let jobs = self.api.list_jobs(kind, false).await?;
            self.registry.apply_listing(kind, jobs);
        }
        Ok(())
    }

    async fn poll_loop(&self) {
        self.set_status(TransportStatus::Polling);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        // The first tick completes immediately and the initial listing already ran
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(()) => {}
                Err(e) if e.is_unreachable() => debug!("Backend unreachable, polling on: {}", e),
                Err(e) => warn!("Job poll failed: {}", e),
            }
        }
    }

    async fn resolve_ws_url(&self) -> Option<String> {
        if let Some(url) = &self.config.ws_url {
            return Some(url.clone());
        }

        match self.api.runtime().await {
            Ok(runtime) => ws_url_from_runtime(&self.config.backend_url, &runtime),
            Err(e) => {
                warn!("Runtime discovery failed: {}", e);
                None
            }
        }
    }

    async fn connect(&self, ws_url: &str) -> Option<WsStream> {
        info!(url = %ws_url, "Connecting to push channel");
        match connect_async(ws_url).await {
            Ok((stream, _response)) => {
                info!("Push channel connected");
                Some(stream)
            }
            Err(e) => {
                warn!(error = %e, "Push channel connection failed");
                None
            }
        }
    }

    async fn run_session(&self, mut stream: WsStream) {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.handle_text(&text);
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Backend closed push channel");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite, binary frames unused
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel receive error");
                    break;
                }
                None => {
                    info!("Push channel stream ended");
                    break;
                }
            }
        }
    }

    fn set_status(&self, status: TransportStatus) {
        self.events.emit(SyncEvent::Transport(status));
    }
}

/// Derives the push channel URL from the backend URL and the runtime advertisement
///
/// The host of the backend is kept; the scheme becomes `ws`/`wss` and port and
/// path come from the advertisement.
///
/// # Returns
/// `None` when push is disabled or the backend URL cannot be parsed
pub fn ws_url_from_runtime(backend_url: &str, runtime: &RuntimeInfo) -> Option<String> {
    if !runtime.ws_enabled {
        return None;
    }

    let mut url = Url::parse(backend_url).ok()?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).ok()?;
    if runtime.ws_port != 0 {
        url.set_port(Some(runtime.ws_port)).ok()?;
    }

    let path = runtime.ws_path.trim();
    if path.is_empty() {
        url.set_path("/ws");
    } else if path.starts_with('/') {
        url.set_path(path);
    } else {
        url.set_path(&format!("/{path}"));
    }
    url.set_query(None);

    Some(url.to_string())
}
