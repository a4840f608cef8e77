//! Task creation: record + worktree + engine invocation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::adapters::AdapterSet;
use crate::engine::run_task;
use crate::io::config::{ProjectConfig, load_project_config};
use crate::io::ids::{branch_name, generate_task_id};
use crate::io::store::{TaskRecord, TaskStore};
use crate::io::tmux;
use crate::io::worktree::create_worktree;

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub repo: PathBuf,
    pub spec: PathBuf,
    pub use_tmux: bool,
}

/// Create a task for `spec` and drive it to completion (or a pause).
pub fn start_task(store: &TaskStore, options: &StartOptions) -> Result<TaskRecord> {
    if !options.spec.is_file() {
        return Err(anyhow!("spec file not found: {}", options.spec.display()));
    }
    let config = load_project_config(&options.repo)?;
    let adapters = AdapterSet::from_models(&config.models)?;

    let record = create_task(store, &config, &options.spec, options.use_tmux)?;
    info!(task_id = %record.task_id, branch = %record.branch, "task created");

    run_task(store, record, &config, &adapters)
}

/// Create and persist a fresh `PENDING` record with its worktree (and
/// optionally an attachable tmux session).
pub fn create_task(
    store: &TaskStore,
    config: &ProjectConfig,
    spec: &Path,
    use_tmux: bool,
) -> Result<TaskRecord> {
    let task_id = generate_task_id();
    let branch = branch_name(&task_id);
    let worktree = config.global.worktrees_dir.join(&task_id);

    create_worktree(&config.project_root, &worktree, &branch)
        .with_context(|| format!("create worktree for task {task_id}"))?;

    let mut record = TaskRecord::create(
        task_id,
        &config.project_root,
        &worktree,
        branch,
        spec,
        &config.policy,
        &config.models,
    );

    if use_tmux && tmux::available() {
        let session = format!("orch-{}", record.task_id);
        if tmux::create_session(&session, &worktree)? {
            record.tmux_session = Some(session);
        }
    }

    store.set(&record)
}
