//! Task exclusion gate
//!
//! Ask and analyze compete over one video. At most one local task may run
//! per resource across both kinds, and a task of one kind observed running
//! in another session blocks starting the other kind here. Re-observing the
//! same kind remotely does not block.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use tracing::debug;
use tubesync_core::domain::task::{TaskKind, TaskLock, TaskOrigin};

use crate::events::{EventBus, SyncEvent};
use crate::lock;

/// Why a start was refused
///
/// A busy signal, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    /// The same kind is already running locally
    AlreadyRunning { kind: TaskKind },
    /// The other kind holds the resource
    BlockedBy {
        requested: TaskKind,
        blocking: TaskKind,
        origin: TaskOrigin,
    },
}

impl GateRejection {
    pub fn message(&self) -> String {
        match self {
            Self::AlreadyRunning { kind } => {
                format!("{kind} is already running for this video")
            }
            Self::BlockedBy {
                requested,
                blocking,
                origin: TaskOrigin::Local,
            } => format!("Cannot start {requested} while {blocking} is running"),
            Self::BlockedBy {
                requested,
                blocking,
                origin: TaskOrigin::Remote,
            } => format!("Cannot start {requested} while {blocking} is running in another session"),
        }
    }
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Default)]
struct ResourceLocks {
    local: Option<TaskKind>,
    remote: HashSet<TaskKind>,
}

impl ResourceLocks {
    fn is_idle(&self) -> bool {
        self.local.is_none() && self.remote.is_empty()
    }
}

/// Single-flight gate for ask/analyze per video
pub struct TaskExclusionGate {
    locks: Mutex<HashMap<String, ResourceLocks>>,
    events: EventBus,
}

impl TaskExclusionGate {
    pub fn new(events: EventBus) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Marks `kind` active locally on `resource_id` if nothing conflicts
    pub fn try_start(&self, resource_id: &str, kind: TaskKind) -> Result<(), GateRejection> {
        {
            let mut locks = lock(&self.locks);
            let entry = locks.entry(resource_id.to_string()).or_default();

            match entry.local {
                Some(active) if active == kind => {
                    return Err(GateRejection::AlreadyRunning { kind });
                }
                Some(active) => {
                    return Err(GateRejection::BlockedBy {
                        requested: kind,
                        blocking: active,
                        origin: TaskOrigin::Local,
                    });
                }
                None => {}
            }

            if entry.remote.contains(&kind.other()) {
                return Err(GateRejection::BlockedBy {
                    requested: kind,
                    blocking: kind.other(),
                    origin: TaskOrigin::Remote,
                });
            }

            entry.local = Some(kind);
        }

        debug!(resource_id, kind = kind.as_str(), "Task started");
        self.changed(resource_id);
        Ok(())
    }

    /// Releases the local lock if it is held by `kind`
    ///
    /// A late finish of a superseded task leaves a newer lock alone.
    ///
    /// # Returns
    /// `true` if the lock was released
    pub fn finish(&self, resource_id: &str, kind: TaskKind) -> bool {
        let released = {
            let mut locks = lock(&self.locks);
            match locks.get_mut(resource_id) {
                Some(entry) if entry.local == Some(kind) => {
                    entry.local = None;
                    if entry.is_idle() {
                        locks.remove(resource_id);
                    }
                    true
                }
                _ => false,
            }
        };

        if released {
            self.changed(resource_id);
        }
        released
    }

    /// Records `kind` as running in another session
    pub fn observe_remote(&self, resource_id: &str, kind: TaskKind) {
        let inserted = lock(&self.locks)
            .entry(resource_id.to_string())
            .or_default()
            .remote
            .insert(kind);
        if inserted {
            self.changed(resource_id);
        }
    }

    /// Forgets a remote observation of `kind`
    pub fn clear_remote(&self, resource_id: &str, kind: TaskKind) {
        let removed = {
            let mut locks = lock(&self.locks);
            match locks.get_mut(resource_id) {
                Some(entry) => {
                    let removed = entry.remote.remove(&kind);
                    if entry.is_idle() {
                        locks.remove(resource_id);
                    }
                    removed
                }
                None => false,
            }
        };
        if removed {
            self.changed(resource_id);
        }
    }

    /// Replaces the remote observations of `resource_id` with `busy`
    pub fn sync_remote(&self, resource_id: &str, busy: &[TaskKind]) {
        let changed = {
            let mut locks = lock(&self.locks);
            let entry = locks.entry(resource_id.to_string()).or_default();
            let next: HashSet<TaskKind> = busy.iter().copied().collect();
            let changed = entry.remote != next;
            entry.remote = next;
            if entry.is_idle() {
                locks.remove(resource_id);
            }
            changed
        };
        if changed {
            self.changed(resource_id);
        }
    }

    /// Absorbs a server "already running" answer to a local request
    ///
    /// The server is running `kind` for someone else: the local lock taken
    /// for the request is released and the task is recorded as remote.
    pub fn absorb_server_busy(&self, resource_id: &str, kind: TaskKind) {
        {
            let mut locks = lock(&self.locks);
            let entry = locks.entry(resource_id.to_string()).or_default();
            if entry.local == Some(kind) {
                entry.local = None;
            }
            entry.remote.insert(kind);
        }
        debug!(resource_id, kind = kind.as_str(), "Server reports task running elsewhere");
        self.changed(resource_id);
    }

    /// Every lock currently held on `resource_id`
    pub fn active(&self, resource_id: &str) -> Vec<TaskLock> {
        let locks = lock(&self.locks);
        let Some(entry) = locks.get(resource_id) else {
            return Vec::new();
        };

        let mut active: Vec<TaskLock> = entry
            .local
            .iter()
            .map(|kind| (*kind, TaskOrigin::Local))
            .chain(entry.remote.iter().map(|kind| (*kind, TaskOrigin::Remote)))
            .map(|(task_kind, origin)| TaskLock {
                resource_id: resource_id.to_string(),
                task_kind,
                origin,
            })
            .collect();
        active.sort_by_key(|l| (l.origin == TaskOrigin::Remote, l.task_kind.as_str()));
        active
    }

    pub fn is_busy(&self, resource_id: &str) -> bool {
        lock(&self.locks)
            .get(resource_id)
            .is_some_and(|entry| !entry.is_idle())
    }

    fn changed(&self, resource_id: &str) {
        self.events.emit(SyncEvent::GateChanged {
            resource_id: resource_id.to_string(),
        });
    }
}
