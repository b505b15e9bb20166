//! Persisted user preferences
//!
//! Two records live in the key/value store: UI preferences (including the
//! execution mode per task kind) and the default parameters of new research
//! brews. Both are normalized on load and on save.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tubesync_core::domain::task::{ExecutionMode, TaskKind};
use tubesync_core::dto::job::StartBrewRequest;

use crate::store::{KeyValueStore, load_json, save_json};

pub const UI_PREFS_KEY: &str = "ui_prefs_v1";
pub const BREW_FILTERS_KEY: &str = "brew_filters_v1";

const MAX_DURATION_SEC: u32 = 21_600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub language: String,
    pub theme: String,
    pub last_view: String,
    pub last_video_id: String,
    pub last_job_id: String,
    pub ask_mode: ExecutionMode,
    pub analyze_mode: ExecutionMode,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            theme: "system".to_string(),
            last_view: "jobs".to_string(),
            last_video_id: String::new(),
            last_job_id: String::new(),
            ask_mode: ExecutionMode::Server,
            analyze_mode: ExecutionMode::Server,
        }
    }
}

impl Preferences {
    pub fn execution_mode(&self, kind: TaskKind) -> ExecutionMode {
        match kind {
            TaskKind::Ask => self.ask_mode,
            TaskKind::Analyze => self.analyze_mode,
        }
    }

    pub fn set_execution_mode(&mut self, kind: TaskKind, mode: ExecutionMode) {
        match kind {
            TaskKind::Ask => self.ask_mode = mode,
            TaskKind::Analyze => self.analyze_mode = mode,
        }
    }

    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        for (field, fallback) in [
            (&mut self.language, defaults.language),
            (&mut self.theme, defaults.theme),
            (&mut self.last_view, defaults.last_view),
        ] {
            let trimmed = field.trim().to_string();
            *field = if trimmed.is_empty() { fallback } else { trimmed };
        }
        self.last_video_id = self.last_video_id.trim().to_string();
        self.last_job_id = self.last_job_id.trim().to_string();
        self
    }
}

/// Default parameters for new research brews
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewFilters {
    pub max_videos: u32,
    pub max_queries: u32,
    pub per_query: u32,
    pub min_duration_sec: u32,
    pub max_duration_sec: u32,
    pub captions_only: bool,
    pub private_run: bool,
}

impl Default for BrewFilters {
    fn default() -> Self {
        Self {
            max_videos: 6,
            max_queries: 8,
            per_query: 8,
            min_duration_sec: 0,
            max_duration_sec: MAX_DURATION_SEC,
            captions_only: true,
            private_run: false,
        }
    }
}

impl BrewFilters {
    /// Clamps every field into its allowed range
    ///
    /// A minimum duration above the maximum is lowered to the maximum.
    pub fn normalized(mut self) -> Self {
        self.max_videos = self.max_videos.clamp(2, 40);
        self.max_queries = self.max_queries.clamp(3, 30);
        self.per_query = self.per_query.clamp(3, 30);
        self.max_duration_sec = self.max_duration_sec.min(MAX_DURATION_SEC);
        self.min_duration_sec = self.min_duration_sec.min(self.max_duration_sec);
        self
    }

    /// Builds a brew request for `topic` from these filters
    pub fn request(&self, topic: &str) -> StartBrewRequest {
        let filters = self.clone().normalized();
        StartBrewRequest {
            topic: topic.trim().to_string(),
            private_run: filters.private_run,
            max_videos: filters.max_videos,
            max_queries: filters.max_queries,
            per_query: filters.per_query,
            min_duration_sec: filters.min_duration_sec,
            max_duration_sec: filters.max_duration_sec,
            captions_only: filters.captions_only,
        }
    }
}

/// Typed access to the persisted preference records
///
/// Reads fail open to defaults; write failures are logged by the store.
pub struct PreferenceStore {
    store: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Preferences {
        load_json::<Preferences>(self.store.as_ref(), UI_PREFS_KEY)
            .unwrap_or_default()
            .normalized()
    }

    pub fn save(&self, prefs: &Preferences) -> bool {
        save_json(self.store.as_ref(), UI_PREFS_KEY, &prefs.clone().normalized())
    }

    /// Loads, modifies and saves the UI preferences
    pub fn update<F: FnOnce(&mut Preferences)>(&self, apply: F) -> Preferences {
        let mut prefs = self.load();
        apply(&mut prefs);
        let prefs = prefs.normalized();
        self.save(&prefs);
        prefs
    }

    pub fn execution_mode(&self, kind: TaskKind) -> ExecutionMode {
        self.load().execution_mode(kind)
    }

    pub fn set_execution_mode(&self, kind: TaskKind, mode: ExecutionMode) {
        self.update(|prefs| prefs.set_execution_mode(kind, mode));
    }

    pub fn brew_filters(&self) -> BrewFilters {
        load_json::<BrewFilters>(self.store.as_ref(), BREW_FILTERS_KEY)
            .unwrap_or_default()
            .normalized()
    }

    pub fn save_brew_filters(&self, filters: &BrewFilters) -> BrewFilters {
        let filters = filters.clone().normalized();
        save_json(self.store.as_ref(), BREW_FILTERS_KEY, &filters);
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn prefs() -> (Arc<MemoryStore>, PreferenceStore) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), PreferenceStore::new(store))
    }

    #[test]
    fn test_missing_records_load_defaults() {
        let (_, prefs) = prefs();
        assert_eq!(prefs.load(), Preferences::default());
        assert_eq!(prefs.brew_filters(), BrewFilters::default());
        assert_eq!(prefs.execution_mode(TaskKind::Analyze), ExecutionMode::Server);
    }

    #[test]
    fn test_execution_mode_round_trips_per_kind() {
        let (_, prefs) = prefs();
        prefs.set_execution_mode(TaskKind::Analyze, ExecutionMode::Local);

        assert_eq!(prefs.execution_mode(TaskKind::Analyze), ExecutionMode::Local);
        assert_eq!(prefs.execution_mode(TaskKind::Ask), ExecutionMode::Server);
    }

    #[test]
    fn test_blank_fields_fall_back_to_defaults() {
        let (store, prefs) = prefs();
        store
            .set(UI_PREFS_KEY, &json!({"language": "  ", "theme": "dark", "last_video_id": " abc "}).to_string())
            .unwrap();

        let loaded = prefs.load();
        assert_eq!(loaded.language, "en");
        assert_eq!(loaded.theme, "dark");
        assert_eq!(loaded.last_video_id, "abc");
    }

    #[test]
    fn test_brew_filters_are_clamped_on_load() {
        let (store, prefs) = prefs();
        store
            .set(
                BREW_FILTERS_KEY,
                &json!({"max_videos": 500, "max_queries": 1, "per_query": 31, "min_duration_sec": 30000, "max_duration_sec": 99999})
                    .to_string(),
            )
            .unwrap();

        let filters = prefs.brew_filters();
        assert_eq!(filters.max_videos, 40);
        assert_eq!(filters.max_queries, 3);
        assert_eq!(filters.per_query, 30);
        assert_eq!(filters.max_duration_sec, 21_600);
        assert_eq!(filters.min_duration_sec, 21_600);
        assert!(filters.captions_only);
    }

    #[test]
    fn test_saved_filters_are_normalized() {
        let (_, prefs) = prefs();
        let saved = prefs.save_brew_filters(&BrewFilters {
            max_videos: 1,
            ..BrewFilters::default()
        });
        assert_eq!(saved.max_videos, 2);
        assert_eq!(prefs.brew_filters().max_videos, 2);
    }

    #[test]
    fn test_request_from_filters() {
        let request = BrewFilters::default().request("  home espresso ");
        assert_eq!(request.topic, "home espresso");
        assert_eq!(request.max_videos, 6);
        assert!(request.captions_only);
    }
}
