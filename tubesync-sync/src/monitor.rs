//! Server save monitor
//!
//! Tracks one server-side save until the saved video shows up in the server
//! video list, or gives up after a bounded number of polls. While waiting a
//! synthetic, monotonically increasing percentage is published so the user
//! sees liveness; it carries no ground truth.
//!
//! The monitor does not guard against a second monitor for the same URL.
//! Callers keep that single-flight set (see the download service).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tubesync_core::domain::progress::SaveProgressRecord;
use tubesync_core::domain::recent::SaveStatus;
use tubesync_core::domain::video::extract_video_id;
use tubesync_core::dto::video::VideoSummary;

use crate::config::SyncConfig;
use crate::progress::SaveProgressStore;
use crate::recent::RecentCache;
use crate::repository::BackendRepository;

const INITIAL_PERCENT: f64 = 5.0;
const FAST_RAMP_PERCENT: f64 = 60.0;
const UNCONFIRMED_CAP: f64 = 95.0;

/// Polling bounds of a save monitor
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub max_iterations: u32,
    pub delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 90,
            delay: Duration::from_secs(4),
        }
    }
}

impl From<&SyncConfig> for MonitorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_iterations: config.monitor_max_iterations,
            delay: config.monitor_delay,
        }
    }
}

/// What a monitor is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTarget {
    /// Source URL, also the progress and cache key
    pub url: String,
    pub video_id: Option<String>,
}

impl SaveTarget {
    /// Builds a target, deriving the video id from the URL when not given
    pub fn new(url: &str, video_id: Option<&str>) -> Self {
        let video_id = video_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| extract_video_id(url));
        Self {
            url: url.trim().to_string(),
            video_id,
        }
    }

    /// Returns `true` if `video` is a confirmed save of this target
    pub fn matches(&self, video: &VideoSummary) -> bool {
        if video.public_url.trim().is_empty() {
            return false;
        }
        if let Some(id) = &self.video_id {
            if video.video_id == *id {
                return true;
            }
        }
        [video.source_url.trim(), video.youtube_url.trim()]
            .into_iter()
            .any(|u| !u.is_empty() && u == self.url)
    }
}

/// Terminal outcome of a monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Saved { public_url: String },
    TimedOut,
}

/// Synthetic percentage after `iteration` unconfirmed polls
///
/// Ramps quickly to 60% during the first fifth of the budget, then slowly
/// towards 95%. Never reaches 100 while unconfirmed.
pub fn synthetic_percent(iteration: u32, max_iterations: u32) -> f64 {
    let max = f64::from(max_iterations.max(1));
    let i = f64::from(iteration.min(max_iterations.max(1)));
    let fast = (max / 5.0).max(1.0);

    let percent = if i <= fast {
        INITIAL_PERCENT + (FAST_RAMP_PERCENT - INITIAL_PERCENT) * i / fast
    } else {
        FAST_RAMP_PERCENT + (UNCONFIRMED_CAP - FAST_RAMP_PERCENT) * (i - fast) / (max - fast).max(1.0)
    };
    percent.min(UNCONFIRMED_CAP)
}

/// Bounded polling loop tracking server-side saves
pub struct SaveProgressMonitor {
    api: Arc<dyn BackendRepository>,
    recent: Arc<RecentCache>,
    progress: Arc<SaveProgressStore>,
    config: MonitorConfig,
}

impl SaveProgressMonitor {
    pub fn new(
        api: Arc<dyn BackendRepository>,
        recent: Arc<RecentCache>,
        progress: Arc<SaveProgressStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            api,
            recent,
            progress,
            config,
        }
    }

    /// Polls until the save is confirmed or the iteration budget is spent
    ///
    /// On confirmation the progress record becomes `done`, the recent entry
    /// is marked saved and the recent view is reconciled with the fresh
    /// video list. On timeout both become `error`. API errors during a poll
    /// are logged and count as an unconfirmed iteration.
    pub async fn run(&self, target: SaveTarget) -> MonitorOutcome {
        let key = target.url.clone();
        let max = self.config.max_iterations;
        let mut percent = self
            .progress
            .get(&key)
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.percent())
            .unwrap_or(0.0)
            .max(INITIAL_PERCENT);
        self.progress
            .set(&key, SaveProgressRecord::running(percent, "Saving on server..."));

        for iteration in 1..=max {
            tokio::time::sleep(self.config.delay).await;

            match self.api.list_videos().await {
                Ok(videos) => {
                    if let Some(video) = videos.iter().find(|v| target.matches(v)) {
                        let public_url = video.public_url.trim().to_string();
                        let title = video.title.clone();
                        info!(url = %key, iteration, "Server save confirmed");

                        self.progress.set(&key, SaveProgressRecord::done("Saved on server"));
                        self.recent.mark_saved(&key, &public_url, Some(&title), Utc::now());
                        self.recent.reconcile(videos, Utc::now());
                        return MonitorOutcome::Saved { public_url };
                    }
                }
                Err(e) => {
                    warn!(url = %key, iteration, "Save status poll failed: {}", e);
                }
            }

            percent = percent.max(synthetic_percent(iteration, max));
            debug!(url = %key, iteration, percent, "Save not confirmed yet");
            self.progress.set(
                &key,
                SaveProgressRecord::running(percent, format!("Saving on server... ({iteration}/{max})")),
            );
            if iteration == 1 {
                self.recent.mark_status(&key, SaveStatus::Running, "", Utc::now());
            }
        }

        let message = format!("Save was not confirmed after {max} checks");
        warn!(url = %key, "{}", message);
        self.progress.set(&key, SaveProgressRecord::error(percent, message.clone()));
        self.recent.mark_status(&key, SaveStatus::Error, &message, Utc::now());
        MonitorOutcome::TimedOut
    }

    /// Runs the monitor on a background task
    pub fn spawn(self: Arc<Self>, target: SaveTarget) -> JoinHandle<MonitorOutcome> {
        tokio::spawn(async move { self.run(target).await })
    }
}
