//! Job registry
//!
//! In-memory map of job snapshots fed by the transport, pull listings and
//! start responses. Updates are full replacements keyed by job id; there is
//! no field-level merge.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;
use tubesync_core::domain::NormalizeError;
use tubesync_core::domain::job::{Job, JobKindTag};

use crate::events::{EventBus, SyncEvent};
use crate::lock;

#[derive(Debug, Default)]
struct RegistryState {
    jobs: HashMap<JobKindTag, HashMap<String, Job>>,
    /// Ids of the latest pull listing
    listed: HashMap<JobKindTag, HashSet<String>>,
    /// Active ids seen through push or start responses since that listing
    observed: HashMap<JobKindTag, HashSet<String>>,
    selected: HashMap<JobKindTag, String>,
}

impl RegistryState {
    fn is_listed(&self, kind: JobKindTag, id: &str) -> bool {
        [&self.listed, &self.observed]
            .into_iter()
            .any(|ids| ids.get(&kind).is_some_and(|ids| ids.contains(id)))
    }

    fn active(&self, kind: Option<JobKindTag>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|(k, _)| kind.is_none_or(|wanted| **k == wanted))
            .flat_map(|(_, jobs)| jobs.values())
            .filter(|job| job.is_active())
            .cloned()
            .collect();
        sort_newest_first(&mut jobs);
        jobs
    }
}

fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

/// Registry of every job observed during a session
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    events: EventBus,
    reject_stale: bool,
}

impl JobRegistry {
    /// Creates an empty registry
    ///
    /// # Arguments
    /// * `events` - Bus notified after every change
    /// * `reject_stale` - Ignore snapshots whose `updated_at` is older than the stored one
    pub fn new(events: EventBus, reject_stale: bool) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
            reject_stale,
        }
    }

    /// Stores a snapshot, replacing any previous one with the same id
    ///
    /// An active snapshot joins the selection projection; a finished one
    /// leaves it unless the last pull listing still holds it.
    ///
    /// # Returns
    /// `true` if the stored state changed
    pub fn upsert(&self, job: Job) -> bool {
        let kind = job.tag();
        let changed = {
            let mut state = lock(&self.state);
            let id = job.id().to_string();
            let active = job.is_active();

            let slot = state.jobs.entry(kind).or_default();
            let stored = match slot.get(&id) {
                Some(existing) if self.reject_stale && job.updated_at() < existing.updated_at() => {
                    debug!(job_id = %id, "Ignoring out-of-order job snapshot");
                    return false;
                }
                Some(existing) => *existing != job,
                None => true,
            };
            if stored {
                slot.insert(id.clone(), job);
            }

            let observed = state.observed.entry(kind).or_default();
            let projection_changed = if active {
                observed.insert(id)
            } else {
                observed.remove(&id)
            };
            stored || projection_changed
        };

        if changed {
            self.events.emit(SyncEvent::JobsChanged { kind });
        }
        changed
    }

    /// Normalizes a raw snapshot and stores it
    pub fn upsert_raw(&self, kind: JobKindTag, raw: &Value) -> Result<bool, NormalizeError> {
        let job = Job::from_snapshot(kind, raw)?;
        Ok(self.upsert(job))
    }

    /// Applies a full pull listing of one kind
    ///
    /// Every listed snapshot is upserted and the listing becomes the new
    /// projection used by selection. Jobs missing from the listing stay
    /// addressable by id.
    pub fn apply_listing(&self, kind: JobKindTag, jobs: Vec<Job>) {
        let ids: HashSet<String> = jobs.iter().map(|j| j.id().to_string()).collect();
        let mut changed = false;
        for job in jobs {
            changed |= self.upsert_quiet(job);
        }

        {
            let mut state = lock(&self.state);
            let previous = state.listed.insert(kind, ids.clone());
            changed |= previous.as_ref() != Some(&ids);
            state.observed.remove(&kind);
        }

        if changed {
            self.events.emit(SyncEvent::JobsChanged { kind });
        }
    }

    fn upsert_quiet(&self, job: Job) -> bool {
        let mut state = lock(&self.state);
        let slot = state.jobs.entry(job.tag()).or_default();
        match slot.get(job.id()) {
            Some(existing) if self.reject_stale && job.updated_at() < existing.updated_at() => false,
            Some(existing) if *existing == job => false,
            _ => {
                slot.insert(job.id().to_string(), job);
                true
            }
        }
    }

    /// Looks a job up by id, whatever its status
    pub fn get(&self, job_id: &str) -> Option<Job> {
        let state = lock(&self.state);
        state
            .jobs
            .values()
            .find_map(|jobs| jobs.get(job_id))
            .cloned()
    }

    /// Queued and running jobs, newest first
    ///
    /// # Arguments
    /// * `kind` - Restrict to one job family, or `None` for all
    pub fn active_jobs(&self, kind: Option<JobKindTag>) -> Vec<Job> {
        lock(&self.state).active(kind)
    }

    /// Every known job of one kind, newest first
    pub fn jobs(&self, kind: JobKindTag) -> Vec<Job> {
        let state = lock(&self.state);
        let mut jobs: Vec<Job> = state
            .jobs
            .get(&kind)
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default();
        sort_newest_first(&mut jobs);
        jobs
    }

    pub fn len(&self) -> usize {
        lock(&self.state).jobs.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicitly selects a job
    ///
    /// # Returns
    /// `true` if the selection changed; selecting the current job or an
    /// unknown id is a no-op
    pub fn select(&self, kind: JobKindTag, job_id: &str) -> bool {
        {
            let mut state = lock(&self.state);
            if state.selected.get(&kind).is_some_and(|id| id == job_id) {
                return false;
            }
            let known = state
                .jobs
                .get(&kind)
                .is_some_and(|jobs| jobs.contains_key(job_id));
            if !known {
                return false;
            }
            state.selected.insert(kind, job_id.to_string());
        }

        self.events.emit(SyncEvent::SelectionChanged {
            kind,
            job_id: Some(job_id.to_string()),
        });
        true
    }

    /// Currently selected job of one kind
    ///
    /// The selection is kept while the job is active or still part of the
    /// listing projection. Otherwise the newest active job is selected, or
    /// nothing when no job is active.
    pub fn selected_job(&self, kind: JobKindTag) -> Option<Job> {
        let (job, changed) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;

            let current = state
                .selected
                .get(&kind)
                .and_then(|id| state.jobs.get(&kind).and_then(|jobs| jobs.get(id)))
                .filter(|job| job.is_active() || state.is_listed(kind, job.id()))
                .cloned();

            match current {
                Some(job) => (Some(job), false),
                None => {
                    let next = state.active(Some(kind)).into_iter().next();
                    let previous = match &next {
                        Some(job) => state.selected.insert(kind, job.id().to_string()),
                        None => state.selected.remove(&kind),
                    };
                    let changed = previous.as_deref() != next.as_ref().map(Job::id);
                    (next, changed)
                }
            }
        };

        if changed {
            self.events.emit(SyncEvent::SelectionChanged {
                kind,
                job_id: job.as_ref().map(|j| j.id().to_string()),
            });
        }
        job
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::job;
    use serde_json::json;
    use tubesync_core::domain::job::JobStatus;

    const BREW: JobKindTag = JobKindTag::ResearchBrew;

    fn registry() -> JobRegistry {
        JobRegistry::new(EventBus::new(), false)
    }

    #[test]
    fn test_upsert_replaces_whole_snapshot() {
        let registry = registry();
        registry
            .upsert_raw(
                BREW,
                &json!({"job_id": "j1", "status": "running", "topic": "coffee", "error": ""}),
            )
            .unwrap();
        registry
            .upsert_raw(BREW, &json!({"job_id": "j1", "status": "failed", "error": "quota"}))
            .unwrap();

        let stored = registry.get("j1").unwrap();
        assert_eq!(stored.status(), JobStatus::Failed);
        match stored.kind() {
            tubesync_core::domain::job::JobKind::ResearchBrew(details) => {
                // No field-level merge: the topic of the first snapshot is gone
                assert_eq!(details.topic, "");
                assert_eq!(details.error, "quota");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identical_upsert_is_not_a_change() {
        let registry = registry();
        let j = job(BREW, "j1", "running", "2025-01-01T10:00:00Z");
        assert!(registry.upsert(j.clone()));
        assert!(!registry.upsert(j));
    }

    #[test]
    fn test_completed_job_leaves_active_list_but_stays_addressable() {
        let registry = registry();
        registry
            .upsert_raw(
                BREW,
                &json!({"id": "j1", "status": "running", "progress": {"step": 3, "totalSteps": 5, "ratio": 0.5}}),
            )
            .unwrap();
        assert_eq!(registry.active_jobs(None).len(), 1);

        registry
            .upsert_raw(
                BREW,
                &json!({"id": "j1", "status": "completed", "progress": {"step": 5, "totalSteps": 5, "ratio": 1.0}}),
            )
            .unwrap();

        assert!(registry.active_jobs(None).is_empty());
        let stored = registry.get("j1").unwrap();
        assert_eq!(stored.status(), JobStatus::Completed);
        assert_eq!(stored.progress().step, 5);
        assert_eq!(stored.progress().ratio, 1.0);
    }

    #[test]
    fn test_active_jobs_sorted_newest_first() {
        let registry = registry();
        registry.upsert(job(BREW, "old", "running", "2025-01-01T09:00:00Z"));
        registry.upsert(job(BREW, "new", "queued", "2025-01-01T11:00:00Z"));
        registry.upsert(job(BREW, "mid", "running", "2025-01-01T10:00:00Z"));
        registry.upsert(job(BREW, "done", "done", "2025-01-01T12:00:00Z"));

        let ids: Vec<String> = registry
            .active_jobs(Some(BREW))
            .iter()
            .map(|j| j.id().to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_active_jobs_filters_by_kind() {
        let registry = registry();
        registry.upsert(job(BREW, "b1", "running", "2025-01-01T09:00:00Z"));
        registry.upsert(job(JobKindTag::ComponentTestRun, "t1", "running", "2025-01-01T09:00:00Z"));

        assert_eq!(registry.active_jobs(None).len(), 2);
        assert_eq!(registry.active_jobs(Some(BREW)).len(), 1);
        assert_eq!(registry.active_jobs(Some(JobKindTag::ComponentTestRun))[0].id(), "t1");
    }

    #[test]
    fn test_stale_rejection_when_enabled() {
        let registry = JobRegistry::new(EventBus::new(), true);
        registry.upsert(job(BREW, "j1", "completed", "2025-01-01T12:00:00Z"));
        assert!(!registry.upsert(job(BREW, "j1", "running", "2025-01-01T11:00:00Z")));
        assert_eq!(registry.get("j1").unwrap().status(), JobStatus::Completed);
    }

    #[test]
    fn test_last_write_wins_by_default() {
        let registry = registry();
        registry.upsert(job(BREW, "j1", "completed", "2025-01-01T12:00:00Z"));
        assert!(registry.upsert(job(BREW, "j1", "running", "2025-01-01T11:00:00Z")));
        assert_eq!(registry.get("j1").unwrap().status(), JobStatus::Running);
    }

    #[test]
    fn test_selected_job_auto_assigns_first_active() {
        let registry = registry();
        assert!(registry.selected_job(BREW).is_none());

        registry.upsert(job(BREW, "a", "running", "2025-01-01T09:00:00Z"));
        registry.upsert(job(BREW, "b", "running", "2025-01-01T10:00:00Z"));
        assert_eq!(registry.selected_job(BREW).unwrap().id(), "b");
    }

    #[test]
    fn test_select_is_idempotent() {
        let registry = registry();
        let mut rx = registry.events.subscribe();
        registry.upsert(job(BREW, "a", "running", "2025-01-01T09:00:00Z"));

        assert!(registry.select(BREW, "a"));
        assert!(!registry.select(BREW, "a"));
        assert!(!registry.select(BREW, "missing"));

        let mut selection_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SyncEvent::SelectionChanged { .. }) {
                selection_events += 1;
            }
        }
        assert_eq!(selection_events, 1);
    }

    #[test]
    fn test_finished_selection_kept_while_listed() {
        let registry = registry();
        registry.apply_listing(
            BREW,
            vec![
                job(BREW, "a", "running", "2025-01-01T09:00:00Z"),
                job(BREW, "b", "running", "2025-01-01T10:00:00Z"),
            ],
        );
        registry.select(BREW, "a");

        // Finished but still part of the listing projection
        registry.upsert(job(BREW, "a", "completed", "2025-01-01T11:00:00Z"));
        assert_eq!(registry.selected_job(BREW).unwrap().id(), "a");

        // Pruned from the listing: selection moves to the active job
        registry.apply_listing(BREW, vec![job(BREW, "b", "running", "2025-01-01T10:00:00Z")]);
        assert_eq!(registry.selected_job(BREW).unwrap().id(), "b");
        assert!(registry.get("a").is_some());
    }

    #[test]
    fn test_pushed_finish_moves_selection_without_a_listing() {
        let registry = registry();
        registry.upsert(job(BREW, "a", "running", "2025-01-01T09:00:00Z"));
        registry.upsert(job(BREW, "b", "running", "2025-01-01T10:00:00Z"));
        registry.select(BREW, "a");
        assert_eq!(registry.selected_job(BREW).unwrap().id(), "a");

        assert!(registry.upsert(job(BREW, "a", "completed", "2025-01-01T11:00:00Z")));

        assert_eq!(registry.selected_job(BREW).unwrap().id(), "b");
        assert_eq!(registry.get("a").unwrap().status(), JobStatus::Completed);
    }

    #[test]
    fn test_selection_cleared_when_nothing_active() {
        let registry = registry();
        registry.upsert(job(BREW, "a", "running", "2025-01-01T09:00:00Z"));
        assert!(registry.selected_job(BREW).is_some());

        registry.apply_listing(BREW, vec![]);
        registry.upsert_quiet(job(BREW, "a", "failed", "2025-01-01T09:30:00Z"));
        assert!(registry.selected_job(BREW).is_none());
    }
}
