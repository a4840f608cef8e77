//! Verification command runner: lint -> typecheck -> test.
//!
//! Each category stops at its first failing command so the repair prompt sees
//! one focused failure per category instead of a wall of cascading errors.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::io::config::CommandsConfig;
use crate::io::process::run_shell;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
const OUTPUT_LIMIT_BYTES: usize = 200_000;

/// Aggregate outcome of one verification pass.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub passed: bool,
    /// Concatenated, labelled output of each failing command.
    pub failure_output: String,
}

/// Run every configured command group inside the worktree, logging each step
/// under `logs_dir` as `verify-<group>-<attempt>.log`.
#[instrument(skip_all, fields(attempt))]
pub fn run_verification(
    worktree: &Path,
    commands: &CommandsConfig,
    logs_dir: &Path,
    attempt: u32,
) -> Result<VerifyReport> {
    let groups: [(&str, &[String]); 3] = [
        ("lint", &commands.lint),
        ("typecheck", &commands.typecheck),
        ("test", &commands.test),
    ];

    let mut failure_parts: Vec<String> = Vec::new();

    for (name, cmds) in groups {
        for cmd in cmds {
            let output = run_shell(cmd, worktree, COMMAND_TIMEOUT, OUTPUT_LIMIT_BYTES)?;

            let log = format!(
                "Command: {cmd}\nExit code: {}\nTimed out: {}\n\nSTDOUT:\n{}\nSTDERR:\n{}",
                output.exit_code, output.timed_out, output.stdout, output.stderr
            );
            write_step_log(logs_dir, name, attempt, &log)?;

            if output.success() {
                debug!(group = name, command = %cmd, "verification step passed");
                continue;
            }

            warn!(group = name, command = %cmd, exit_code = output.exit_code, timed_out = output.timed_out, "verification step failed");
            let status = if output.timed_out {
                format!("timed out after {}s", COMMAND_TIMEOUT.as_secs())
            } else {
                format!("exit {}", output.exit_code)
            };
            failure_parts.push(format!(
                "[{} FAILED]\nCommand: {cmd}\nStatus: {status}\n{}{}",
                name.to_uppercase(),
                output.stdout,
                output.stderr
            ));
            // First failure per category keeps the repair prompt focused.
            break;
        }
    }

    Ok(VerifyReport {
        passed: failure_parts.is_empty(),
        failure_output: failure_parts.join("\n\n---\n\n"),
    })
}

fn write_step_log(logs_dir: &Path, group: &str, attempt: u32, contents: &str) -> Result<()> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("create logs dir {}", logs_dir.display()))?;
    let path = logs_dir.join(format!("verify-{group}-{attempt}.log"));
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(lint: &[&str], typecheck: &[&str], test: &[&str]) -> CommandsConfig {
        let to_vec = |cmds: &[&str]| cmds.iter().map(|c| c.to_string()).collect();
        CommandsConfig {
            lint: to_vec(lint),
            typecheck: to_vec(typecheck),
            test: to_vec(test),
        }
    }

    #[test]
    fn all_groups_passing_yields_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = run_verification(
            temp.path(),
            &commands(&["true"], &[], &["echo ok"]),
            &temp.path().join("logs"),
            0,
        )
        .expect("verify");
        assert!(report.passed);
        assert!(report.failure_output.is_empty());
        assert!(temp.path().join("logs/verify-lint-0.log").exists());
        assert!(temp.path().join("logs/verify-test-0.log").exists());
    }

    #[test]
    fn empty_config_passes_trivially() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = run_verification(
            temp.path(),
            &CommandsConfig::default(),
            &temp.path().join("logs"),
            0,
        )
        .expect("verify");
        assert!(report.passed);
    }

    #[test]
    fn failure_stops_within_category_but_not_across() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = run_verification(
            temp.path(),
            &commands(
                &["echo lint-one && false", "echo lint-two"],
                &[],
                &["echo test-ran"],
            ),
            &temp.path().join("logs"),
            1,
        )
        .expect("verify");

        assert!(!report.passed);
        assert!(report.failure_output.contains("[LINT FAILED]"));
        assert!(report.failure_output.contains("lint-one"));
        // Second lint command is skipped after the first failure.
        let lint_log = std::fs::read_to_string(temp.path().join("logs/verify-lint-1.log"))
            .expect("read lint log");
        assert!(!lint_log.contains("lint-two"));
        // The test category still runs.
        assert!(temp.path().join("logs/verify-test-1.log").exists());
    }

    #[test]
    fn failing_test_output_is_labelled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = run_verification(
            temp.path(),
            &commands(&[], &[], &["echo assertion failed >&2; exit 1"]),
            &temp.path().join("logs"),
            0,
        )
        .expect("verify");

        assert!(!report.passed);
        assert!(report.failure_output.contains("[TEST FAILED]"));
        assert!(report.failure_output.contains("assertion failed"));
        assert!(report.failure_output.contains("exit 1"));
    }
}
