//! Repair phase: replay the failure to the implementer with a narrowed scope.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::adapters::{AdapterRequest, ModelAdapter};
use crate::core::policy::PolicyViolation;
use crate::phases::{RunOutcome, classify};
use crate::prompt::repair_prompt;
use crate::io::worktree::change_snapshot;

pub const REPAIRER_TIMEOUT: Duration = Duration::from_secs(300);

const ERROR_EXCERPT_CHARS: usize = 500;

/// Run the repair agent against the previous failure.
///
/// The files already touched by the current attempt become the allowed edit
/// scope, so each retry has less freedom than the one before it.
#[instrument(skip_all, fields(attempt, retries_remaining))]
pub fn run_repairer(
    adapter: &dyn ModelAdapter,
    plan: &str,
    conventions: Option<&str>,
    failure_output: &str,
    violations: &[PolicyViolation],
    worktree: &Path,
    logs_dir: &Path,
    attempt: u32,
    retries_remaining: u32,
) -> Result<RunOutcome> {
    let touched = change_snapshot(worktree)?.changed_paths;
    debug!(touched = touched.len(), "narrowing repair scope to touched files");

    let outcome = adapter.run(&AdapterRequest {
        prompt: repair_prompt(
            plan,
            conventions,
            failure_output,
            violations,
            retries_remaining,
            &touched,
        ),
        worktree: worktree.to_path_buf(),
        log_path: logs_dir.join(format!("repair-{attempt}.log")),
        timeout: REPAIRER_TIMEOUT,
    })?;
    Ok(classify(&outcome, "repair agent", ERROR_EXCERPT_CHARS))
}
