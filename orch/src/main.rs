//! Deterministic AI orchestration controller.
//!
//! Drives multi-stage code-change tasks through isolated git worktrees using
//! external model CLIs as workers. Task state lives in a crash-safe registry
//! (`~/.config/orch/registry.json`); every run is resumable.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use orch::clean::clean_tasks;
use orch::core::fsm::TaskStatus;
use orch::io::config::{init_project_config, registry_path};
use orch::io::store::TaskStore;
use orch::kill::kill_task;
use orch::resume::resume_tasks;
use orch::start::{StartOptions, start_task};
use orch::status::render_status;

#[derive(Parser)]
#[command(
    name = "orch",
    version,
    about = "Deterministic AI orchestration controller"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize .orch/ config in a repo.
    Init {
        /// Path to repo (default: cwd).
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Overwrite existing config files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run a task from a spec markdown file.
    Run {
        spec: PathBuf,
        /// Path to repo (default: cwd).
        #[arg(long)]
        repo: Option<PathBuf>,
        /// Disable tmux session spawning.
        #[arg(long)]
        no_tmux: bool,
    },
    /// Show all task states.
    Status {
        /// Filter by status (e.g. NEEDS_HUMAN).
        #[arg(long)]
        filter: Option<String>,
    },
    /// Resume paused or rate-limited tasks.
    Resume,
    /// Stop a running task and mark it FAILED.
    Kill { task_id: String },
    /// Remove finished task worktrees and registry entries.
    Clean {
        /// Clean all tasks including in-progress ones.
        #[arg(long)]
        all: bool,
    },
}

fn main() {
    orch::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = TaskStore::new(registry_path());

    match cli.command {
        Command::Init { repo, force } => cmd_init(repo, force),
        Command::Run { spec, repo, no_tmux } => cmd_run(&store, spec, repo, no_tmux),
        Command::Status { filter } => {
            print!("{}", render_status(&store.list()?, filter.as_deref()));
            Ok(())
        }
        Command::Resume => cmd_resume(&store),
        Command::Kill { task_id } => cmd_kill(&store, &task_id),
        Command::Clean { all } => {
            let removed = clean_tasks(&store, all)?;
            println!("cleaned {} task(s)", removed.len());
            Ok(())
        }
    }
}

fn cmd_init(repo: Option<PathBuf>, force: bool) -> Result<()> {
    let repo = resolve_repo(repo)?;
    let written = init_project_config(&repo, force)?;
    if written.is_empty() {
        println!("config already present in {}", repo.join(".orch").display());
    } else {
        for path in written {
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn cmd_run(store: &TaskStore, spec: PathBuf, repo: Option<PathBuf>, no_tmux: bool) -> Result<()> {
    let options = StartOptions {
        repo: resolve_repo(repo)?,
        spec: spec
            .canonicalize()
            .with_context(|| format!("spec file not found: {}", spec.display()))?,
        use_tmux: !no_tmux,
    };

    let record = start_task(store, &options)?;

    println!("\norch: task {} finished {}", record.task_id, record.status);
    println!("  branch:    {}", record.branch);
    println!("  worktree:  {}", record.worktree_path.display());
    println!("  artifacts: {}", record.artifacts_path.display());
    match record.status {
        TaskStatus::Done => {
            println!("\n  Branch is ready for review; the worktree is preserved.");
        }
        TaskStatus::NeedsHuman => {
            println!(
                "\n  NEEDS_HUMAN: see {}",
                record.artifacts_path.join("summary.md").display()
            );
        }
        TaskStatus::RateLimited => {
            println!("\n  Rate limited. Run `orch resume` when tokens refresh.");
        }
        _ => {}
    }
    Ok(())
}

fn cmd_resume(store: &TaskStore) -> Result<()> {
    let report = resume_tasks(store)?;
    if report.resumed.is_empty() && report.skipped.is_empty() {
        println!("No resumable tasks found.");
        if let Some(at) = report.next_retry_at {
            let wait = (at - chrono::Utc::now()).num_minutes().max(0);
            println!("  rate-limited task(s) ready in ~{wait} min");
        }
        return Ok(());
    }
    for (task_id, status) in &report.resumed {
        println!("  {task_id} -> {status}");
    }
    for (task_id, reason) in &report.skipped {
        println!("  {task_id} skipped: {reason}");
    }
    Ok(())
}

fn cmd_kill(store: &TaskStore, task_id: &str) -> Result<()> {
    let task = kill_task(store, task_id)?;
    println!("task {} marked FAILED", task.task_id);
    println!("  worktree preserved at {}", task.worktree_path.display());
    println!("  run `orch clean` to remove worktrees");
    Ok(())
}

fn resolve_repo(repo: Option<PathBuf>) -> Result<PathBuf> {
    match repo {
        Some(path) => path
            .canonicalize()
            .with_context(|| format!("repo not found: {}", path.display())),
        None => Ok(std::env::current_dir()?),
    }
}
