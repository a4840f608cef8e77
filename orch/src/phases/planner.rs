//! Planning phase: spec in, execution plan out.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::adapters::{AdapterRequest, ModelAdapter};
use crate::phases::{RunOutcome, classify};
use crate::prompt::planner_prompt;

pub const PLANNER_TIMEOUT: Duration = Duration::from_secs(120);

/// The plan is written into the worktree so it is inspectable and survives a
/// controller restart.
pub const PLAN_FILE: &str = ".orch-plan.md";

const ERROR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Success { plan: String },
    Failure { error: String },
    RateLimited,
}

#[instrument(skip_all)]
pub fn run_planner(
    adapter: &dyn ModelAdapter,
    spec_path: &Path,
    worktree: &Path,
    logs_dir: &Path,
) -> Result<PlanOutcome> {
    let spec = fs::read_to_string(spec_path)
        .with_context(|| format!("read spec {}", spec_path.display()))?;

    let outcome = adapter.run(&AdapterRequest {
        prompt: planner_prompt(&spec),
        worktree: worktree.to_path_buf(),
        log_path: logs_dir.join("planner.log"),
        timeout: PLANNER_TIMEOUT,
    })?;

    match classify(&outcome, "planner", ERROR_EXCERPT_CHARS) {
        RunOutcome::RateLimited => Ok(PlanOutcome::RateLimited),
        RunOutcome::Failure { error } => Ok(PlanOutcome::Failure { error }),
        RunOutcome::Success => {
            let plan = outcome.stdout;
            let plan_path = worktree.join(PLAN_FILE);
            fs::write(&plan_path, &plan)
                .with_context(|| format!("write plan {}", plan_path.display()))?;
            debug!(plan_bytes = plan.len(), "plan written");
            Ok(PlanOutcome::Success { plan })
        }
    }
}

/// Reload a previously written plan when resuming a task mid-cycle.
pub fn load_saved_plan(worktree: &Path) -> Option<String> {
    fs::read_to_string(worktree.join(PLAN_FILE)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAdapter, failed, ok, rate_limited};

    fn setup(temp: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let spec_path = temp.path().join("spec.md");
        fs::write(&spec_path, "# Add a health endpoint\n").expect("write spec");
        (spec_path, temp.path().join("logs"))
    }

    #[test]
    fn success_writes_plan_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (spec_path, logs) = setup(&temp);
        let adapter = ScriptedAdapter::with_outcomes(vec![ok("1. edit src/health.rs\n")]);

        let outcome = run_planner(&adapter, &spec_path, temp.path(), &logs).expect("plan");
        assert_eq!(
            outcome,
            PlanOutcome::Success {
                plan: "1. edit src/health.rs\n".to_string()
            }
        );
        assert_eq!(
            load_saved_plan(temp.path()),
            Some("1. edit src/health.rs\n".to_string())
        );
    }

    #[test]
    fn nonzero_exit_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (spec_path, logs) = setup(&temp);
        let adapter = ScriptedAdapter::with_outcomes(vec![failed(2, "model crashed")]);

        let PlanOutcome::Failure { error } =
            run_planner(&adapter, &spec_path, temp.path(), &logs).expect("plan")
        else {
            panic!("expected failure");
        };
        assert!(error.contains("planner exited 2"));
        assert!(load_saved_plan(temp.path()).is_none());
    }

    #[test]
    fn rate_limit_is_distinguished() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (spec_path, logs) = setup(&temp);
        let adapter = ScriptedAdapter::with_outcomes(vec![rate_limited()]);

        let outcome = run_planner(&adapter, &spec_path, temp.path(), &logs).expect("plan");
        assert_eq!(outcome, PlanOutcome::RateLimited);
    }
}
