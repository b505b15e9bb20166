//! Per-video task kinds guarded by the exclusion gate

use serde::{Deserialize, Serialize};

/// Kinds of notes tasks that compete for one video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Ask,
    Analyze,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Analyze => "analyze",
        }
    }

    /// The competing kind
    pub fn other(self) -> Self {
        match self {
            Self::Ask => Self::Analyze,
            Self::Analyze => Self::Ask,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an active task was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Started by this client
    Local,
    /// Observed as running by another session
    Remote,
}

/// Mutual-exclusion token for one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskLock {
    pub resource_id: String,
    pub task_kind: TaskKind,
    pub origin: TaskOrigin,
}

/// Where a task is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Server,
    Local,
}
