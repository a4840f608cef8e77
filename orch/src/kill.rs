//! Out-of-band task kill: force a terminal state, preserve the evidence.

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::info;

use crate::core::fsm::TaskStatus;
use crate::io::store::{TaskRecord, TaskStore};
use crate::io::tmux;

/// Mark a task `FAILED` and tear down its tmux session. The worktree and all
/// artifacts are deliberately left in place for inspection.
pub fn kill_task(store: &TaskStore, task_id: &str) -> Result<TaskRecord> {
    let mut task = store
        .get(task_id)?
        .ok_or_else(|| anyhow!("task not found: {task_id}"))?;

    if let Some(session) = &task.tmux_session {
        if tmux::session_exists(session)? {
            tmux::kill_session(session)?;
            info!(session = %session, "killed tmux session");
        }
    }

    task.status = TaskStatus::Failed;
    task.retry_after = None;
    task.pre_rate_limit_status = None;
    task.set_failure_summary(&format!("killed by user at {}", Utc::now().to_rfc3339()));
    store.set(&task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyConfig;
    use crate::io::config::ModelsConfig;
    use std::path::Path;

    #[test]
    fn kill_marks_failed_and_clears_rate_limit_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path().join("registry.json"));

        let mut record = TaskRecord::create(
            "t1".to_string(),
            Path::new("/repo"),
            Path::new("/wt"),
            "orch/t1".to_string(),
            Path::new("/repo/spec.md"),
            &PolicyConfig::default(),
            &ModelsConfig::default(),
        );
        record.status = TaskStatus::RateLimited;
        record.pre_rate_limit_status = Some(TaskStatus::Executing);
        record.retry_after = Some(Utc::now());
        store.set(&record).expect("set");

        let killed = kill_task(&store, "t1").expect("kill");
        assert_eq!(killed.status, TaskStatus::Failed);
        assert_eq!(killed.retry_after, None);
        assert_eq!(killed.pre_rate_limit_status, None);
        assert!(
            killed
                .last_failure_summary
                .as_deref()
                .unwrap_or_default()
                .contains("killed by user")
        );
    }

    #[test]
    fn kill_unknown_task_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::new(temp.path().join("registry.json"));
        let err = kill_task(&store, "missing").expect_err("should fail");
        assert!(err.to_string().contains("task not found"));
    }
}
