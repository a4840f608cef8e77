//! Resume paused and interrupted tasks.
//!
//! Rate-limited tasks come back once their backoff has elapsed, restored to
//! the state they paused in. Tasks left non-terminal by a killed controller
//! are re-driven from their last persisted state. Resumption is polled by
//! this pass — the engine never self-schedules a wakeup.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::adapters::AdapterSet;
use crate::core::fsm::TaskStatus;
use crate::engine::run_task;
use crate::io::config::load_project_config;
use crate::io::store::{TaskRecord, TaskStore};

/// What a resume pass did.
#[derive(Debug, Default)]
pub struct ResumeReport {
    /// Tasks re-driven, with their final status.
    pub resumed: Vec<(String, TaskStatus)>,
    /// Tasks skipped because config loading or adapter setup failed.
    pub skipped: Vec<(String, String)>,
    /// Earliest `retry_after` among tasks still inside their backoff.
    pub next_retry_at: Option<DateTime<Utc>>,
}

fn is_resumable(task: &TaskRecord, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::RateLimited => task.retry_after.is_none_or(|at| now >= at),
        status => !status.is_terminal(),
    }
}

/// Restore a rate-limited record to where it paused.
fn restore(mut task: TaskRecord) -> TaskRecord {
    if task.status == TaskStatus::RateLimited {
        task.status = task
            .pre_rate_limit_status
            .take()
            .unwrap_or(TaskStatus::Executing);
        task.retry_after = None;
    }
    task
}

/// Resume every eligible task sequentially.
pub fn resume_tasks(store: &TaskStore) -> Result<ResumeReport> {
    let now = Utc::now();
    let mut report = ResumeReport::default();

    for task in store.list()? {
        if task.status == TaskStatus::RateLimited && !is_resumable(&task, now) {
            report.next_retry_at = match (report.next_retry_at, task.retry_after) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            continue;
        }
        if !is_resumable(&task, now) {
            continue;
        }

        let task_id = task.task_id.clone();
        info!(task_id = %task_id, status = %task.status, "resuming task");

        let config = match load_project_config(&task.repo_path) {
            Ok(config) => config,
            Err(err) => {
                warn!(task_id = %task_id, err = %err, "cannot load config, skipping");
                report.skipped.push((task_id, err.to_string()));
                continue;
            }
        };
        let adapters = match AdapterSet::from_models(&config.models) {
            Ok(adapters) => adapters,
            Err(err) => {
                warn!(task_id = %task_id, err = %err, "cannot build adapters, skipping");
                report.skipped.push((task_id, err.to_string()));
                continue;
            }
        };

        let restored = store.set(&restore(task))?;
        match run_task(store, restored, &config, &adapters) {
            Ok(finished) => report.resumed.push((task_id, finished.status)),
            Err(err) => {
                warn!(task_id = %task_id, err = %err, "resume failed");
                report.skipped.push((task_id, err.to_string()));
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyConfig;
    use crate::io::config::ModelsConfig;
    use std::path::Path;

    fn record(id: &str, status: TaskStatus) -> TaskRecord {
        let mut r = TaskRecord::create(
            id.to_string(),
            Path::new("/repo"),
            Path::new("/wt"),
            format!("orch/{id}"),
            Path::new("/repo/spec.md"),
            &PolicyConfig::default(),
            &ModelsConfig::default(),
        );
        r.status = status;
        r
    }

    #[test]
    fn terminal_tasks_are_not_resumable() {
        let now = Utc::now();
        assert!(!is_resumable(&record("a", TaskStatus::Done), now));
        assert!(!is_resumable(&record("b", TaskStatus::Failed), now));
        assert!(!is_resumable(&record("c", TaskStatus::NeedsHuman), now));
        assert!(is_resumable(&record("d", TaskStatus::Executing), now));
        assert!(is_resumable(&record("e", TaskStatus::Pending), now));
    }

    #[test]
    fn rate_limited_waits_for_backoff() {
        let now = Utc::now();

        let mut waiting = record("a", TaskStatus::RateLimited);
        waiting.retry_after = Some(now + chrono::Duration::minutes(5));
        assert!(!is_resumable(&waiting, now));

        let mut ready = record("b", TaskStatus::RateLimited);
        ready.retry_after = Some(now - chrono::Duration::seconds(1));
        assert!(is_resumable(&ready, now));

        // A missing retry_after never wedges the task.
        let no_deadline = record("c", TaskStatus::RateLimited);
        assert!(is_resumable(&no_deadline, now));
    }

    #[test]
    fn restore_returns_to_paused_state() {
        let mut task = record("a", TaskStatus::RateLimited);
        task.pre_rate_limit_status = Some(TaskStatus::Repairing);
        task.retry_after = Some(Utc::now());

        let restored = restore(task);
        assert_eq!(restored.status, TaskStatus::Repairing);
        assert_eq!(restored.pre_rate_limit_status, None);
        assert_eq!(restored.retry_after, None);
    }
}
