//! Test-only helpers: scripted adapters and task fixtures.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::adapters::{AdapterOutcome, AdapterRequest, ModelAdapter};
use crate::core::policy::PolicyConfig;
use crate::io::config::{
    CommandsConfig, GlobalConfig, ModelName, ModelsConfig, ProjectConfig,
};
use crate::io::store::{TaskRecord, TaskStore};
use crate::io::worktree::create_worktree;

/// Successful adapter outcome with the given stdout.
pub fn ok(stdout: &str) -> AdapterOutcome {
    AdapterOutcome {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration: Duration::from_millis(10),
        timed_out: false,
        rate_limited: false,
    }
}

/// Failed adapter outcome with the given exit code and stderr.
pub fn failed(exit_code: i32, stderr: &str) -> AdapterOutcome {
    AdapterOutcome {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        duration: Duration::from_millis(10),
        timed_out: false,
        rate_limited: false,
    }
}

/// Adapter outcome that looks like a quota exhaustion.
pub fn rate_limited() -> AdapterOutcome {
    AdapterOutcome {
        exit_code: 1,
        stdout: String::new(),
        stderr: "429 Too Many Requests".to_string(),
        duration: Duration::from_millis(10),
        timed_out: false,
        rate_limited: true,
    }
}

/// One scripted adapter invocation; `write_files` land in the worktree
/// before the outcome is returned, standing in for model edits.
pub struct ScriptedCall {
    pub outcome: AdapterOutcome,
    pub write_files: Vec<(String, String)>,
}

impl ScriptedCall {
    pub fn plain(outcome: AdapterOutcome) -> Self {
        Self {
            outcome,
            write_files: Vec::new(),
        }
    }

    pub fn writing(outcome: AdapterOutcome, path: &str, contents: &str) -> Self {
        Self {
            outcome,
            write_files: vec![(path.to_string(), contents.to_string())],
        }
    }
}

/// Adapter that replays a fixed queue of calls without spawning processes.
pub struct ScriptedAdapter {
    name: ModelName,
    calls: Mutex<VecDeque<ScriptedCall>>,
}

impl ScriptedAdapter {
    pub fn new(name: ModelName, calls: Vec<ScriptedCall>) -> Self {
        Self {
            name,
            calls: Mutex::new(calls.into()),
        }
    }

    /// Outcome-only queue under the default codex identity.
    pub fn with_outcomes(outcomes: Vec<AdapterOutcome>) -> Self {
        Self::new(
            ModelName::Codex,
            outcomes.into_iter().map(ScriptedCall::plain).collect(),
        )
    }
}

impl ModelAdapter for ScriptedAdapter {
    fn name(&self) -> ModelName {
        self.name
    }

    fn run(&self, request: &AdapterRequest) -> Result<AdapterOutcome> {
        let call = self
            .calls
            .lock()
            .map_err(|_| anyhow!("scripted adapter poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("scripted adapter ran out of calls"))?;

        for (path, contents) in &call.write_files {
            let target = request.worktree.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)?;
        }
        Ok(call.outcome)
    }
}

/// A repo, worktree, store, and pending record wired together for engine
/// tests.
pub struct TaskFixture {
    pub temp: TempDir,
    pub store: TaskStore,
    pub config: ProjectConfig,
    pub record: TaskRecord,
}

pub fn task_fixture(policy: PolicyConfig, commands: CommandsConfig) -> Result<TaskFixture> {
    let temp = TempDir::new().context("tempdir")?;
    let repo = temp.path().join("repo");
    fs::create_dir(&repo)?;
    init_git_repo(&repo)?;

    let spec_path = repo.join("spec.md");
    fs::write(&spec_path, "# Test task\nDo the thing.\n")?;
    git_ok(&repo, &["add", "spec.md"])?;
    git_ok(&repo, &["commit", "-m", "chore: add spec"])?;

    let task_id = "20260806T120000-cafe".to_string();
    let branch = format!("orch/{task_id}");
    let worktree = temp.path().join("worktrees").join(&task_id);
    create_worktree(&repo, &worktree, &branch)?;

    let models = ModelsConfig {
        reviewers: vec![ModelName::Codex],
        ..ModelsConfig::default()
    };
    let record = TaskRecord::create(
        task_id, &repo, &worktree, branch, &spec_path, &policy, &models,
    );

    let store = TaskStore::new(temp.path().join("registry.json"));
    store.set(&record)?;

    let config = ProjectConfig {
        policy,
        commands,
        models,
        global: GlobalConfig {
            worktrees_dir: temp.path().join("worktrees"),
        },
        orch_dir: repo.join(".orch"),
        project_root: repo,
    };

    Ok(TaskFixture {
        temp,
        store,
        config,
        record,
    })
}

pub fn init_git_repo(root: &Path) -> Result<()> {
    git_ok(root, &["init"])?;
    git_ok(root, &["config", "user.email", "test@example.com"])?;
    git_ok(root, &["config", "user.name", "test"])?;
    fs::write(root.join("README.md"), "hi\n")?;
    git_ok(root, &["add", "README.md"])?;
    git_ok(root, &["commit", "-m", "chore: init"])?;
    Ok(())
}

fn git_ok(root: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .with_context(|| format!("spawn git {args:?}"))?;
    if !status.success() {
        return Err(anyhow!("git {args:?} failed in {}", root.display()));
    }
    Ok(())
}
