//! Remembering which lessons have been completed.
//!
//! Progress is a convenience, never a reason to fail: unreadable or corrupt
//! data reads as "nothing completed", and write failures are logged.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

/// Storage key under which the progress blob lives.
pub const PROGRESS_KEY: &str = "stringMasterProgress";

pub trait ProgressStore {
    fn completed_lesson_ids(&self) -> BTreeSet<String>;

    /// Record a completion. Marking the same lesson twice is a no-op.
    fn mark_lesson_complete(&mut self, lesson_id: &str);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressData {
    #[serde(rename = "completedLessons", default)]
    completed_lessons: Vec<String>,
}

/// Key-value JSON file; progress is stored under `PROGRESS_KEY`.
/// Other keys in the same file are preserved on write.
pub struct JsonFileProgressStore {
    path: PathBuf,
}

impl JsonFileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Map<String, Value> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(_) => return Map::new(),
        };
        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("Progress file {:?} is not a JSON object, ignoring", self.path);
                Map::new()
            }
            Err(e) => {
                warn!("Failed to parse progress file {:?}: {}", self.path, e);
                Map::new()
            }
        }
    }

    fn read_progress(&self) -> ProgressData {
        match self.read_map().remove(PROGRESS_KEY) {
            Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
                warn!("Corrupt progress entry in {:?}: {}", self.path, e);
                ProgressData::default()
            }),
            None => ProgressData::default(),
        }
    }

    fn write_progress(&self, progress: &ProgressData) -> io::Result<()> {
        let mut map = self.read_map();
        map.insert(PROGRESS_KEY.to_string(), serde_json::to_value(progress)?);
        let json = serde_json::to_string_pretty(&Value::Object(map))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, json)
    }
}

impl ProgressStore for JsonFileProgressStore {
    fn completed_lesson_ids(&self) -> BTreeSet<String> {
        self.read_progress().completed_lessons.into_iter().collect()
    }

    fn mark_lesson_complete(&mut self, lesson_id: &str) {
        let mut progress = self.read_progress();
        if progress.completed_lessons.iter().any(|id| id == lesson_id) {
            return;
        }
        progress.completed_lessons.push(lesson_id.to_string());
        match self.write_progress(&progress) {
            Ok(()) => info!("Lesson {} marked complete in {:?}", lesson_id, self.path),
            Err(e) => error!("Failed to save progress to {:?}: {}", self.path, e),
        }
    }
}

/// In-process store, forgotten on exit.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    completed: BTreeSet<String>,
}

impl ProgressStore for MemoryProgressStore {
    fn completed_lesson_ids(&self) -> BTreeSet<String> {
        self.completed.clone()
    }

    fn mark_lesson_complete(&mut self, lesson_id: &str) {
        self.completed.insert(lesson_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_means_nothing_completed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileProgressStore::new(dir.path().join("progress.json"));
        assert!(store.completed_lesson_ids().is_empty());
    }

    #[test]
    fn test_mark_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("progress.json");
        let mut store = JsonFileProgressStore::new(&path);
        store.mark_lesson_complete("lesson-1");
        store.mark_lesson_complete("lesson-2");
        store.mark_lesson_complete("lesson-1");

        let reopened = JsonFileProgressStore::new(&path);
        let ids: Vec<String> = reopened.completed_lesson_ids().into_iter().collect();
        assert_eq!(ids, vec!["lesson-1", "lesson-2"]);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[PROGRESS_KEY]["completedLessons"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_data_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        for garbage in [
            "not json at all",
            "[1, 2, 3]",
            r#"{"stringMasterProgress": "oops"}"#,
            r#"{"stringMasterProgress": {"completedLessons": 7}}"#,
        ] {
            std::fs::write(&path, garbage).unwrap();
            let store = JsonFileProgressStore::new(&path);
            assert!(store.completed_lesson_ids().is_empty(), "input: {}", garbage);
        }
    }

    #[test]
    fn test_corrupt_file_is_recovered_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{{{{").unwrap();
        let mut store = JsonFileProgressStore::new(&path);
        store.mark_lesson_complete("lesson-2");
        assert!(store.completed_lesson_ids().contains("lesson-2"));
    }

    #[test]
    fn test_unwritable_path_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // The target is a directory, so both the read and the write fail.
        let mut store = JsonFileProgressStore::new(dir.path());
        store.mark_lesson_complete("lesson-1");
        assert!(store.completed_lesson_ids().is_empty());

        let err = store
            .write_progress(&ProgressData {
                completed_lessons: vec!["lesson-1".into()],
            })
            .unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::NotFound);
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_other_keys_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();
        let mut store = JsonFileProgressStore::new(&path);
        store.mark_lesson_complete("lesson-1");
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryProgressStore::default();
        store.mark_lesson_complete("a");
        store.mark_lesson_complete("a");
        assert_eq!(store.completed_lesson_ids().len(), 1);
    }
}
