//! Crash-safe task registry.
//!
//! The registry is a single JSON document `{version, tasks}` rewritten in
//! full on every mutation: serialize to a temp file, then atomically rename
//! over the canonical path. A reader never observes a partial write. The
//! store offers no locking — callers serialize their own read-modify-write
//! sequences (one task has one writer in normal operation).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::fsm::TaskStatus;
use crate::core::policy::PolicyConfig;
use crate::io::config::{ModelName, ModelsConfig};

/// Current on-disk format. Anything else is rejected on load.
pub const REGISTRY_VERSION: u32 = 1;

/// Maximum stored length of `last_failure_summary`.
pub const FAILURE_SUMMARY_LIMIT: usize = 500;

/// Model roles assigned at task creation; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRoles {
    pub planner: ModelName,
    pub implementer: ModelName,
    pub reviewers: Vec<ModelName>,
}

impl From<&ModelsConfig> for ModelRoles {
    fn from(models: &ModelsConfig) -> Self {
        Self {
            planner: models.planner,
            implementer: models.implementer,
            reviewers: models.reviewers.clone(),
        }
    }
}

/// The unit of work and the only persisted entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub repo_path: PathBuf,
    pub worktree_path: PathBuf,
    pub branch: String,
    pub spec_path: PathBuf,
    pub status: TaskStatus,
    pub retries_remaining: u32,
    pub retries_used: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub logs_path: PathBuf,
    pub artifacts_path: PathBuf,
    /// Set while rate limited; resume compares it against the current time.
    pub retry_after: Option<DateTime<Utc>>,
    /// State to restore when the backoff clears.
    pub pre_rate_limit_status: Option<TaskStatus>,
    pub last_failure_summary: Option<String>,
    pub model_used: ModelRoles,
    pub tmux_session: Option<String>,
    pub exit_code: Option<i32>,
}

impl TaskRecord {
    /// Build a fresh `PENDING` record. Derived paths hang off the repo's
    /// `artifacts/<task_id>/` directory.
    pub fn create(
        task_id: String,
        repo_path: &Path,
        worktree_path: &Path,
        branch: String,
        spec_path: &Path,
        policy: &PolicyConfig,
        models: &ModelsConfig,
    ) -> Self {
        let now = Utc::now();
        let artifacts_path = repo_path.join("artifacts").join(&task_id);
        Self {
            task_id,
            repo_path: repo_path.to_path_buf(),
            worktree_path: worktree_path.to_path_buf(),
            branch,
            spec_path: spec_path.to_path_buf(),
            status: TaskStatus::Pending,
            retries_remaining: policy.max_retries,
            retries_used: 0,
            created_at: now,
            updated_at: now,
            logs_path: artifacts_path.join("logs"),
            artifacts_path,
            retry_after: None,
            pre_rate_limit_status: None,
            last_failure_summary: None,
            model_used: ModelRoles::from(models),
            tmux_session: None,
            exit_code: None,
        }
    }

    /// Store a failure summary, truncated to the persisted limit.
    pub fn set_failure_summary(&mut self, text: &str) {
        self.last_failure_summary = Some(text.chars().take(FAILURE_SUMMARY_LIMIT).collect());
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryIndex {
    version: u32,
    tasks: BTreeMap<String, TaskRecord>,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            tasks: BTreeMap::new(),
        }
    }
}

/// Handle to the registry file.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        Ok(self.load()?.tasks.get(task_id).cloned())
    }

    /// Upsert a record, refreshing its `updated_at` stamp. Returns the record
    /// as persisted.
    pub fn set(&self, record: &TaskRecord) -> Result<TaskRecord> {
        let mut index = self.load()?;
        let mut stamped = record.clone();
        stamped.updated_at = Utc::now();
        debug!(task_id = %stamped.task_id, status = %stamped.status, "persisting task record");
        index.tasks.insert(stamped.task_id.clone(), stamped.clone());
        self.save(&index)?;
        Ok(stamped)
    }

    /// All records, ordered by creation time.
    pub fn list(&self) -> Result<Vec<TaskRecord>> {
        let mut records: Vec<TaskRecord> = self.load()?.tasks.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Remove a record. Returns false if the id was absent.
    pub fn delete(&self, task_id: &str) -> Result<bool> {
        let mut index = self.load()?;
        if index.tasks.remove(task_id).is_none() {
            return Ok(false);
        }
        self.save(&index)?;
        Ok(true)
    }

    fn load(&self) -> Result<RegistryIndex> {
        if !self.path.exists() {
            return Ok(RegistryIndex::default());
        }
        let contents =
            fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let index: RegistryIndex = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", self.path.display()))?;
        if index.version != REGISTRY_VERSION {
            // No migration path exists yet; refuse rather than guess.
            return Err(anyhow!(
                "registry {} has version {} but this build expects {}",
                self.path.display(),
                index.version,
                REGISTRY_VERSION
            ));
        }
        Ok(index)
    }

    fn save(&self, index: &RegistryIndex) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("registry path missing parent {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;

        let mut buf = serde_json::to_string_pretty(index)?;
        buf.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp registry {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace registry {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ModelsConfig;

    fn record(id: &str) -> TaskRecord {
        TaskRecord::create(
            id.to_string(),
            Path::new("/repo"),
            Path::new("/worktrees/t"),
            format!("orch/{id}"),
            Path::new("/repo/spec.md"),
            &PolicyConfig::default(),
            &ModelsConfig::default(),
        )
    }

    fn store_in(dir: &Path) -> TaskStore {
        TaskStore::new(dir.join("registry.json"))
    }

    #[test]
    fn get_absent_returns_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        assert!(store.get("nope").expect("get").is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());

        let saved = store.set(&record("t1")).expect("set");
        let loaded = store.get("t1").expect("get").expect("present");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(
            loaded.retries_remaining,
            PolicyConfig::default().max_retries
        );
    }

    #[test]
    fn set_refreshes_updated_at_monotonically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());

        let first = store.set(&record("t1")).expect("set");
        let second = store.set(&first).expect("set again");
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn list_orders_by_creation_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());

        let mut early = record("b-second");
        let mut earlier = record("a-first");
        earlier.created_at = Utc::now() - chrono::Duration::seconds(60);
        early.created_at = Utc::now() - chrono::Duration::seconds(30);
        store.set(&early).expect("set");
        store.set(&earlier).expect("set");

        let ids: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|r| r.task_id)
            .collect();
        assert_eq!(ids, vec!["a-first".to_string(), "b-second".to_string()]);
    }

    #[test]
    fn delete_reports_presence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store.set(&record("t1")).expect("set");

        assert!(store.delete("t1").expect("delete"));
        assert!(!store.delete("t1").expect("delete again"));
        assert!(store.get("t1").expect("get").is_none());
    }

    /// A kill between the temp write and the rename leaves a stale `.tmp`
    /// file; the store must still serve the prior snapshot.
    #[test]
    fn stale_temp_file_does_not_corrupt_reads() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store.set(&record("t1")).expect("set");

        fs::write(
            temp.path().join("registry.json.tmp"),
            "{ this is half-written garbag",
        )
        .expect("write stale tmp");

        let loaded = store.get("t1").expect("get").expect("present");
        assert_eq!(loaded.task_id, "t1");
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("registry.json");
        fs::write(&path, "{\"version\": 2, \"tasks\": {}}\n").expect("write");

        let err = TaskStore::new(&path).list().expect_err("should reject");
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn failure_summary_is_truncated() {
        let mut r = record("t1");
        r.set_failure_summary(&"e".repeat(2_000));
        assert_eq!(
            r.last_failure_summary.as_ref().map(String::len),
            Some(FAILURE_SUMMARY_LIMIT)
        );
    }
}
