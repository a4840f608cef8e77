//! Execution phase: the implementer model applies the plan to the worktree.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::instrument;

use crate::adapters::{AdapterRequest, ModelAdapter};
use crate::phases::{RunOutcome, classify};
use crate::prompt::executor_prompt;

/// The implementer may need a while to write code.
pub const EXECUTOR_TIMEOUT: Duration = Duration::from_secs(300);

const ERROR_EXCERPT_CHARS: usize = 1_000;

#[instrument(skip_all, fields(attempt))]
pub fn run_executor(
    adapter: &dyn ModelAdapter,
    plan: &str,
    conventions: Option<&str>,
    worktree: &Path,
    logs_dir: &Path,
    attempt: u32,
) -> Result<RunOutcome> {
    let outcome = adapter.run(&AdapterRequest {
        prompt: executor_prompt(plan, conventions),
        worktree: worktree.to_path_buf(),
        log_path: logs_dir.join(format!("executor-{attempt}.log")),
        timeout: EXECUTOR_TIMEOUT,
    })?;
    Ok(classify(&outcome, "executor", ERROR_EXCERPT_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAdapter, failed, ok};

    #[test]
    fn classifies_success_and_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let adapter = ScriptedAdapter::with_outcomes(vec![ok("done"), failed(1, "syntax error")]);

        let first = run_executor(&adapter, "plan", None, temp.path(), &temp.path().join("logs"), 0)
            .expect("exec");
        assert_eq!(first, RunOutcome::Success);

        let second = run_executor(&adapter, "plan", None, temp.path(), &temp.path().join("logs"), 1)
            .expect("exec");
        let RunOutcome::Failure { error } = second else {
            panic!("expected failure");
        };
        assert!(error.contains("executor exited 1"));
    }
}
