//! Cleanup of finished tasks: worktrees, tmux sessions, registry entries.

use anyhow::Result;
use tracing::{info, warn};

use crate::io::store::TaskStore;
use crate::io::tmux;
use crate::io::worktree::remove_worktree;

/// Remove terminal tasks (all tasks with `all`). Returns the removed ids.
pub fn clean_tasks(store: &TaskStore, all: bool) -> Result<Vec<String>> {
    let mut removed = Vec::new();

    for task in store.list()? {
        if !all && !task.status.is_terminal() {
            continue;
        }

        if let Some(session) = &task.tmux_session {
            if tmux::session_exists(session).unwrap_or(false) {
                let _ = tmux::kill_session(session);
            }
        }

        if let Err(err) = remove_worktree(&task.repo_path, &task.worktree_path) {
            // Keep the registry entry so the worktree stays discoverable.
            warn!(task_id = %task.task_id, err = %err, "failed to remove worktree, keeping record");
            continue;
        }

        store.delete(&task.task_id)?;
        info!(task_id = %task.task_id, "task cleaned");
        removed.push(task.task_id);
    }

    Ok(removed)
}
