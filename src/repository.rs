//! Task, occurrence, and execution storage.
//!
//! Three logical tables keyed by record id (executions by occurrence id),
//! with upsert semantics: `add_*` with an existing id overwrites. The
//! in-memory store backs tests; the JSON store persists a versioned snapshot
//! through a temp-file rename on every mutation.

use crate::error::{Result, ScheduleError};
use crate::model::{TaskDefinition, TaskExecution, TaskOccurrence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Boundary to persistence. Safe for concurrent access from timer threads
/// and the main thread; single-writer semantics within one process.
pub trait TaskRepository: Send + Sync {
    /// Store a task definition, overwriting any record with the same id.
    fn add_task(&self, task: TaskDefinition) -> Result<()>;
    /// Fetch a task by id.
    fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>>;
    /// All task definitions, ordered by id.
    fn list_tasks(&self) -> Result<Vec<TaskDefinition>>;
    /// Store an occurrence, overwriting any record with the same id.
    fn add_occurrence(&self, occurrence: TaskOccurrence) -> Result<()>;
    /// All occurrences, ordered by id.
    fn list_occurrences(&self) -> Result<Vec<TaskOccurrence>>;
    /// Store an execution record, overwriting any record for the same
    /// occurrence.
    fn add_execution(&self, execution: TaskExecution) -> Result<()>;
    /// All execution records, ordered by occurrence id.
    fn list_executions(&self) -> Result<Vec<TaskExecution>>;
    /// Delete a task together with all of its occurrences and the
    /// executions referring to them.
    fn delete_task_and_related(&self, task_id: &str) -> Result<()>;
}

/// The three tables. `BTreeMap` keeps listing order deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    occurrences: BTreeMap<String, TaskOccurrence>,
    #[serde(default)]
    executions: BTreeMap<String, TaskExecution>,
}

impl Tables {
    fn delete_task_and_related(&mut self, task_id: &str) {
        self.tasks.remove(task_id);
        let doomed: Vec<String> = self
            .occurrences
            .values()
            .filter(|o| o.task_id == task_id)
            .map(|o| o.id.clone())
            .collect();
        for occurrence_id in &doomed {
            self.occurrences.remove(occurrence_id);
            self.executions.remove(occurrence_id);
        }
    }
}

/// In-memory repository. The test backbone; also useful for ephemeral
/// schedulers.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}

impl TaskRepository for InMemoryRepository {
    fn add_task(&self, task: TaskDefinition) -> Result<()> {
        self.with_tables(|t| t.tasks.insert(task.id.clone(), task));
        Ok(())
    }

    fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>> {
        Ok(self.with_tables(|t| t.tasks.get(task_id).cloned()))
    }

    fn list_tasks(&self) -> Result<Vec<TaskDefinition>> {
        Ok(self.with_tables(|t| t.tasks.values().cloned().collect()))
    }

    fn add_occurrence(&self, occurrence: TaskOccurrence) -> Result<()> {
        self.with_tables(|t| t.occurrences.insert(occurrence.id.clone(), occurrence));
        Ok(())
    }

    fn list_occurrences(&self) -> Result<Vec<TaskOccurrence>> {
        Ok(self.with_tables(|t| t.occurrences.values().cloned().collect()))
    }

    fn add_execution(&self, execution: TaskExecution) -> Result<()> {
        self.with_tables(|t| {
            t.executions
                .insert(execution.occurrence_id.clone(), execution)
        });
        Ok(())
    }

    fn list_executions(&self) -> Result<Vec<TaskExecution>> {
        Ok(self.with_tables(|t| t.executions.values().cloned().collect()))
    }

    fn delete_task_and_related(&self, task_id: &str) -> Result<()> {
        self.with_tables(|t| t.delete_task_and_related(task_id));
        Ok(())
    }
}

/// Persisted store layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    /// Schema version.
    #[serde(default = "default_store_version")]
    version: u8,
    #[serde(default)]
    tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    occurrences: BTreeMap<String, TaskOccurrence>,
    #[serde(default)]
    executions: BTreeMap<String, TaskExecution>,
}

fn default_store_version() -> u8 {
    1
}

/// File-backed repository persisting a JSON snapshot of all three tables.
///
/// Every mutation rewrites the snapshot through a temp file and rename, so
/// a crash mid-write never leaves a torn store.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl JsonFileRepository {
    /// Open a repository at `path`, loading the existing snapshot if one is
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = load_snapshot(&path)?;
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Path of the backing snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_tables_and_persist<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut tables);
        save_snapshot(&self.path, &tables)?;
        Ok(out)
    }

    fn with_tables<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&tables)
    }
}

impl TaskRepository for JsonFileRepository {
    fn add_task(&self, task: TaskDefinition) -> Result<()> {
        self.with_tables_and_persist(|t| {
            t.tasks.insert(task.id.clone(), task);
        })
    }

    fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>> {
        Ok(self.with_tables(|t| t.tasks.get(task_id).cloned()))
    }

    fn list_tasks(&self) -> Result<Vec<TaskDefinition>> {
        Ok(self.with_tables(|t| t.tasks.values().cloned().collect()))
    }

    fn add_occurrence(&self, occurrence: TaskOccurrence) -> Result<()> {
        self.with_tables_and_persist(|t| {
            t.occurrences.insert(occurrence.id.clone(), occurrence);
        })
    }

    fn list_occurrences(&self) -> Result<Vec<TaskOccurrence>> {
        Ok(self.with_tables(|t| t.occurrences.values().cloned().collect()))
    }

    fn add_execution(&self, execution: TaskExecution) -> Result<()> {
        self.with_tables_and_persist(|t| {
            t.executions
                .insert(execution.occurrence_id.clone(), execution);
        })
    }

    fn list_executions(&self) -> Result<Vec<TaskExecution>> {
        Ok(self.with_tables(|t| t.executions.values().cloned().collect()))
    }

    fn delete_task_and_related(&self, task_id: &str) -> Result<()> {
        self.with_tables_and_persist(|t| t.delete_task_and_related(task_id))
    }
}

fn load_snapshot(path: &Path) -> Result<Tables> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no store snapshot at {}, starting empty", path.display());
            return Ok(Tables::default());
        }
        Err(e) => {
            return Err(ScheduleError::Store(format!(
                "cannot read store snapshot: {e}"
            )));
        }
    };

    let state: StoreState = serde_json::from_slice(&bytes)
        .map_err(|e| ScheduleError::Store(format!("cannot parse store snapshot: {e}")))?;

    Ok(Tables {
        tasks: state.tasks,
        occurrences: state.occurrences,
        executions: state.executions,
    })
}

fn save_snapshot(path: &Path, tables: &Tables) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ScheduleError::Store(format!("cannot create store directory: {e}")))?;
    }

    let state = StoreState {
        version: default_store_version(),
        tasks: tables.tasks.clone(),
        occurrences: tables.occurrences.clone(),
        executions: tables.executions.clone(),
    };

    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| ScheduleError::Store(format!("cannot serialize store snapshot: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| ScheduleError::Store(format!("cannot write store temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| ScheduleError::Store(format!("cannot finalize store snapshot: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::NaiveDate;

    fn monday_at(h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 13)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn sample_task(id: &str) -> TaskDefinition {
        TaskDefinition {
            id: id.to_owned(),
            ..TaskDefinition::new("Sample", monday_at(8))
        }
    }

    #[test]
    fn add_task_is_an_upsert() {
        let repo = InMemoryRepository::new();
        repo.add_task(sample_task("t1")).unwrap();

        let mut renamed = sample_task("t1");
        renamed.title = "Renamed".to_owned();
        repo.add_task(renamed).unwrap();

        let tasks = repo.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Renamed");
    }

    #[test]
    fn get_task_returns_none_for_unknown_id() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_task("missing").unwrap().is_none());
    }

    #[test]
    fn executions_are_keyed_by_occurrence() {
        let repo = InMemoryRepository::new();
        repo.add_execution(TaskExecution::pending("o1", 2)).unwrap();
        repo.add_execution(TaskExecution::pending("o1", 0)).unwrap();

        let executions = repo.list_executions().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].retries_remaining, 0);
    }

    #[test]
    fn listing_order_is_deterministic() {
        let repo = InMemoryRepository::new();
        repo.add_occurrence(TaskOccurrence::in_slot("b", "t1", monday_at(10), "morning"))
            .unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("a", "t1", monday_at(9), "morning"))
            .unwrap();

        let ids: Vec<String> = repo
            .list_occurrences()
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn delete_task_cascades_to_occurrences_and_executions() {
        let repo = InMemoryRepository::new();
        repo.add_task(sample_task("t1")).unwrap();
        repo.add_task(sample_task("t2")).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday_at(9), "morning"))
            .unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o2", "t2", monday_at(10), "morning"))
            .unwrap();
        repo.add_execution(TaskExecution::pending("o1", 1)).unwrap();
        repo.add_execution(TaskExecution::pending("o2", 1)).unwrap();

        repo.delete_task_and_related("t1").unwrap();

        assert!(repo.get_task("t1").unwrap().is_none());
        assert!(repo.get_task("t2").unwrap().is_some());
        let occurrence_ids: Vec<String> = repo
            .list_occurrences()
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(occurrence_ids, vec!["o2".to_owned()]);
        let execution_ids: Vec<String> = repo
            .list_executions()
            .unwrap()
            .into_iter()
            .map(|e| e.occurrence_id)
            .collect();
        assert_eq!(execution_ids, vec!["o2".to_owned()]);
    }

    #[test]
    fn json_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let repo = JsonFileRepository::open(&path).unwrap();
            repo.add_task(sample_task("t1")).unwrap();
            repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday_at(9), "morning"))
                .unwrap();
            repo.add_execution(TaskExecution::pending("o1", 1)).unwrap();
        }

        let reopened = JsonFileRepository::open(&path).unwrap();
        assert!(reopened.get_task("t1").unwrap().is_some());
        assert_eq!(reopened.list_occurrences().unwrap().len(), 1);
        assert_eq!(reopened.list_executions().unwrap().len(), 1);
    }

    #[test]
    fn json_store_starts_empty_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("fresh.json")).unwrap();
        assert!(repo.list_tasks().unwrap().is_empty());
    }

    #[test]
    fn json_store_rejects_malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileRepository::open(&path).is_err());
    }

    #[test]
    fn json_store_snapshot_carries_a_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let repo = JsonFileRepository::open(&path).unwrap();
        repo.add_task(sample_task("t1")).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""version": 1"#));
    }
}
