//! Save progress records
//!
//! Transient, never persisted. The percentage of an unconfirmed save is
//! synthesized by the client and carries no ground truth.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Done,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Progress of one in-flight save, keyed by source URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveProgressRecord {
    pub status: ProgressStatus,
    percent: f64,
    pub message: String,
}

impl SaveProgressRecord {
    /// Builds a record with `percent` clamped into `[0, 100]`
    ///
    /// NaN is stored as `0`.
    pub fn new(status: ProgressStatus, percent: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            percent: clamp_percent(percent),
            message: message.into(),
        }
    }

    pub fn running(percent: f64, message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Running, percent, message)
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Done, 100.0, message)
    }

    pub fn error(percent: f64, message: impl Into<String>) -> Self {
        Self::new(ProgressStatus::Error, percent, message)
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}

/// Clamps a percentage into `[0, 100]`, mapping NaN to `0`
pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}
