//! Git worktree collaborator.
//!
//! Each task gets an isolated branch + working copy; the controller only ever
//! mutates files through model processes running inside that copy, so this
//! wrapper stays small and explicit.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Create an isolated branch + working copy for a task.
///
/// Prefers basing the branch on `origin/main` / `origin/master`; repos with
/// no such remote fall back to `HEAD`.
#[instrument(skip_all, fields(branch))]
pub fn create_worktree(repo: &Path, worktree: &Path, branch: &str) -> Result<()> {
    if let Some(parent) = worktree.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create worktrees dir {}", parent.display()))?;
    }
    let git = Git::new(repo);
    let worktree_str = worktree
        .to_str()
        .ok_or_else(|| anyhow!("worktree path is not valid UTF-8"))?;

    for base in ["origin/main", "origin/master", "HEAD"] {
        let output = git.run(&["worktree", "add", worktree_str, "-b", branch, base])?;
        if output.status.success() {
            debug!(base, "worktree created");
            return Ok(());
        }
    }

    // Last resort: let git pick the base itself.
    let output = git.run(&["worktree", "add", worktree_str, "-b", branch])?;
    if !output.status.success() {
        return Err(anyhow!(
            "failed to create worktree at {}: {}",
            worktree.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// Remove a task's working copy. Missing worktrees are not an error.
pub fn remove_worktree(repo: &Path, worktree: &Path) -> Result<()> {
    if !worktree.exists() {
        return Ok(());
    }
    let worktree_str = worktree
        .to_str()
        .ok_or_else(|| anyhow!("worktree path is not valid UTF-8"))?;
    Git::new(repo).run_checked(&["worktree", "remove", "--force", worktree_str])?;
    Ok(())
}

/// One consistent view of a worktree's changes vs its base commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSnapshot {
    /// Raw `git diff --stat HEAD` output.
    pub diff_stat_output: String,
    pub changed_paths: Vec<String>,
}

/// Capture the changed-path list and diff statistics in one pass.
///
/// Untracked files are registered with `--intent-to-add` first so that fresh
/// files created by a model show up in the diff like any other change.
#[instrument(skip_all)]
pub fn change_snapshot(worktree: &Path) -> Result<ChangeSnapshot> {
    let git = Git::new(worktree);

    if let Err(err) = git.run_checked(&["add", "--all", "--intent-to-add"]) {
        warn!(err = %err, "intent-to-add failed, untracked files may be invisible");
    }

    let diff_stat_output = git.run_capture(&["diff", "--stat", "HEAD"])?;
    let changed_paths = git
        .run_capture(&["diff", "--name-only", "HEAD"])?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ChangeSnapshot {
        diff_stat_output,
        changed_paths,
    })
}

/// Full textual diff vs the base commit, for reviewer prompts.
pub fn full_diff(worktree: &Path) -> Result<String> {
    Git::new(worktree).run_capture(&["diff", "HEAD"])
}
