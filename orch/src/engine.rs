//! The orchestration loop.
//!
//! [`run_task`] drives one task record from its current status to a terminal
//! or paused state. Every state change goes through the pure state machine
//! and is persisted before the next phase starts, so a killed controller
//! resumes from the last persisted state, never from whatever was in flight.
//! Each persist re-reads the record first and refuses to clobber a terminal
//! status written externally (e.g. `orch kill` racing the loop).

use std::collections::BTreeMap;
use std::fs;

use anyhow::Result;
use chrono::Utc;

use crate::adapters::AdapterSet;
use crate::core::fsm::{Action, Signal, TaskStatus, Transition, transition};
use crate::core::policy::PolicyViolation;
use crate::io::artifacts::{
    ArtifactPaths, write_diffstat, write_failure, write_summary,
};
use crate::io::config::ProjectConfig;
use crate::io::gate::run_policy_gate;
use crate::io::store::{TaskRecord, TaskStore};
use crate::io::task_log::TaskLog;
use crate::io::verify::run_verification;
use crate::io::worktree::change_snapshot;
use crate::phases::executor::run_executor;
use crate::phases::planner::{PlanOutcome, load_saved_plan, run_planner};
use crate::phases::repairer::run_repairer;
use crate::phases::reviewer::{ReviewOutcome, run_reviewers};
use crate::phases::RunOutcome;

/// Result of a guarded persist.
enum Persisted {
    Current(TaskRecord),
    /// Another writer already moved the record to a terminal state; the
    /// stored record wins and the loop must stand down.
    Superseded(TaskRecord),
}

fn persist_checked(store: &TaskStore, log: &TaskLog, record: &TaskRecord) -> Result<Persisted> {
    if let Some(stored) = store.get(&record.task_id)? {
        if stored.status.is_terminal() && stored.status != record.status {
            log.warn(&format!(
                "record was moved to terminal state {} externally; not overwriting",
                stored.status
            ));
            return Ok(Persisted::Superseded(stored));
        }
    }
    Ok(Persisted::Current(store.set(record)?))
}

/// Apply a transition to the record and persist it.
fn apply(
    store: &TaskStore,
    log: &TaskLog,
    mut record: TaskRecord,
    t: &Transition,
) -> Result<Persisted> {
    record.status = t.next;
    log.info(&format!("state -> {} ({})", t.next, t.reason));
    persist_checked(store, log, &record)
}

/// Pause the task for a rate limit hit in `phase`, recording where to resume.
fn pause_rate_limited(
    store: &TaskStore,
    log: &TaskLog,
    mut record: TaskRecord,
    phase: TaskStatus,
    backoff_ms: u64,
) -> Result<TaskRecord> {
    let t = transition(record.status, &Signal::RateLimitHit, record.retries_remaining);
    debug_assert_eq!(t.action, Action::WaitRateLimit);
    record.status = t.next;
    record.pre_rate_limit_status = Some(phase);
    record.retry_after = Some(Utc::now() + chrono::Duration::milliseconds(backoff_ms as i64));
    log.warn(&format!(
        "rate limited in {phase}; will resume after {}",
        record
            .retry_after
            .map(|at| at.to_rfc3339())
            .unwrap_or_default()
    ));
    match persist_checked(store, log, &record)? {
        Persisted::Current(r) | Persisted::Superseded(r) => Ok(r),
    }
}

/// Consume one retry. The transition is computed against the pre-decrement
/// budget; the budget itself never goes negative.
fn consume_retry(record: &mut TaskRecord) {
    if record.retries_remaining > 0 {
        record.retries_remaining -= 1;
        record.retries_used += 1;
    }
}

/// Drive `record` until it parks in a terminal or rate-limited state.
pub fn run_task(
    store: &TaskStore,
    record: TaskRecord,
    config: &ProjectConfig,
    adapters: &AdapterSet,
) -> Result<TaskRecord> {
    let log = TaskLog::new(&record.logs_path, &record.task_id);
    let paths = ArtifactPaths::for_task(&record);
    paths.ensure_dirs()?;
    let conventions = fs::read_to_string(config.orch_dir.join("AGENTS.md")).ok();

    let mut current = record;

    // A rate-limited record handed to the loop directly is restored to where
    // it paused; `orch resume` normally does this before calling in.
    if current.status == TaskStatus::RateLimited {
        let restored = current.pre_rate_limit_status.take().unwrap_or(TaskStatus::Pending);
        current.status = restored;
        current.retry_after = None;
    }

    if current.status.is_terminal() {
        return Ok(current);
    }

    // --- PENDING/PLANNING: produce or recover the execution plan ---
    let plan = match current.status {
        TaskStatus::Pending | TaskStatus::Planning => {
            if current.status == TaskStatus::Pending {
                let t = transition(current.status, &Signal::Start, current.retries_remaining);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) => r,
                    Persisted::Superseded(r) => return Ok(r),
                };
            }

            match run_planner(
                adapters.planner.as_ref(),
                &current.spec_path,
                &current.worktree_path,
                &paths.logs_dir,
            )? {
                PlanOutcome::RateLimited => {
                    return pause_rate_limited(
                        store,
                        &log,
                        current,
                        TaskStatus::Planning,
                        config.policy.rate_limit_backoff_ms,
                    );
                }
                PlanOutcome::Failure { error } => {
                    let t = transition(
                        current.status,
                        &Signal::ExecError(error.clone()),
                        current.retries_remaining,
                    );
                    current.set_failure_summary(&error);
                    current = match apply(store, &log, current, &t)? {
                        Persisted::Current(r) | Persisted::Superseded(r) => r,
                    };
                    write_summary(&paths, &current, &BTreeMap::new())?;
                    log.error("planning failed; task terminated");
                    return Ok(current);
                }
                PlanOutcome::Success { plan } => {
                    let t = transition(current.status, &Signal::PlanDone, current.retries_remaining);
                    current = match apply(store, &log, current, &t)? {
                        Persisted::Current(r) => r,
                        Persisted::Superseded(r) => return Ok(r),
                    };
                    plan
                }
            }
        }
        // Resuming mid-cycle: the plan was written to the worktree when
        // planning finished.
        _ => match load_saved_plan(&current.worktree_path) {
            Some(plan) => plan,
            // The review phase no longer needs the plan.
            None if current.status == TaskStatus::Reviewing => String::new(),
            None => {
                // Engine-level escalation: the record claims a mid-cycle
                // state but the worktree has lost its plan.
                let t = Transition {
                    next: TaskStatus::NeedsHuman,
                    action: Action::Escalate,
                    reason: "resume found no saved plan in the worktree".to_string(),
                };
                current.set_failure_summary(&t.reason);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) | Persisted::Superseded(r) => r,
                };
                write_summary(&paths, &current, &BTreeMap::new())?;
                return Ok(current);
            }
        },
    };

    // --- Retry cycle: EXECUTING -> VERIFYING -> (REPAIRING -> EXECUTING)* ---
    let mut failure_output = String::new();
    let mut violations: Vec<PolicyViolation> = Vec::new();
    let mut attempt = current.retries_used;

    while matches!(
        current.status,
        TaskStatus::Executing | TaskStatus::Repairing | TaskStatus::Verifying
    ) {
        match current.status {
            TaskStatus::Repairing => {
                let outcome = run_repairer(
                    adapters.implementer.as_ref(),
                    &plan,
                    conventions.as_deref(),
                    &failure_output,
                    &violations,
                    &current.worktree_path,
                    &paths.logs_dir,
                    attempt,
                    current.retries_remaining,
                )?;

                match outcome {
                    RunOutcome::RateLimited => {
                        return pause_rate_limited(
                            store,
                            &log,
                            current,
                            TaskStatus::Repairing,
                            config.policy.rate_limit_backoff_ms,
                        );
                    }
                    RunOutcome::Failure { error } => {
                        // A failed repair still proceeds to execution; the
                        // verifier will classify the attempt.
                        write_failure(&paths, attempt, &error)?;
                        log.warn(&format!("repair agent failed: {error}"));
                    }
                    RunOutcome::Success => {}
                }

                let t = transition(current.status, &Signal::RepairDone, current.retries_remaining);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) => r,
                    Persisted::Superseded(r) => return Ok(r),
                };
            }

            TaskStatus::Executing => {
                let outcome = run_executor(
                    adapters.implementer.as_ref(),
                    &plan,
                    conventions.as_deref(),
                    &current.worktree_path,
                    &paths.logs_dir,
                    attempt,
                )?;

                match outcome {
                    RunOutcome::RateLimited => {
                        return pause_rate_limited(
                            store,
                            &log,
                            current,
                            TaskStatus::Executing,
                            config.policy.rate_limit_backoff_ms,
                        );
                    }
                    RunOutcome::Failure { error } => {
                        failure_output = error;
                        violations.clear();
                        write_failure(&paths, attempt, &failure_output)?;

                        let t = transition(
                            current.status,
                            &Signal::ExecError(failure_output.clone()),
                            current.retries_remaining,
                        );
                        consume_retry(&mut current);
                        current.set_failure_summary(&failure_output);
                        attempt += 1;
                        current = match apply(store, &log, current, &t)? {
                            Persisted::Current(r) => r,
                            Persisted::Superseded(r) => return Ok(r),
                        };
                        if t.action == Action::Escalate {
                            break;
                        }
                    }
                    RunOutcome::Success => {
                        let t = transition(current.status, &Signal::ExecDone, current.retries_remaining);
                        current = match apply(store, &log, current, &t)? {
                            Persisted::Current(r) => r,
                            Persisted::Superseded(r) => return Ok(r),
                        };
                    }
                }
            }

            TaskStatus::Verifying => {
                // Policy gate first: cheap and deterministic, so an
                // out-of-scope change never wastes a verification cycle.
                let gate = run_policy_gate(&current.worktree_path, &config.policy)?;
                write_diffstat(&paths, &gate.diff_stat_output)?;

                if !gate.passed {
                    violations = gate.violations.clone();
                    failure_output = violations
                        .iter()
                        .map(|v| format!("{}: {}", v.kind, v.detail))
                        .collect::<Vec<_>>()
                        .join("\n");
                    write_failure(&paths, attempt, &format!("POLICY VIOLATIONS:\n{failure_output}"))?;

                    let t = transition(
                        current.status,
                        &Signal::PolicyFail(gate.violations),
                        current.retries_remaining,
                    );
                    consume_retry(&mut current);
                    current.set_failure_summary(&failure_output);
                    attempt += 1;
                    current = match apply(store, &log, current, &t)? {
                        Persisted::Current(r) => r,
                        Persisted::Superseded(r) => return Ok(r),
                    };
                    if t.action == Action::Escalate {
                        break;
                    }
                    continue;
                }

                let verify = run_verification(
                    &current.worktree_path,
                    &config.commands,
                    &paths.logs_dir,
                    attempt,
                )?;

                if !verify.passed {
                    failure_output = verify.failure_output;
                    violations.clear();
                    write_failure(&paths, attempt, &failure_output)?;

                    let t = transition(
                        current.status,
                        &Signal::VerifyFail(failure_output.clone()),
                        current.retries_remaining,
                    );
                    consume_retry(&mut current);
                    current.set_failure_summary(&failure_output);
                    attempt += 1;
                    current = match apply(store, &log, current, &t)? {
                        Persisted::Current(r) => r,
                        Persisted::Superseded(r) => return Ok(r),
                    };
                    if t.action == Action::Escalate {
                        break;
                    }
                    continue;
                }

                let t = transition(current.status, &Signal::VerifyPass, current.retries_remaining);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) => r,
                    Persisted::Superseded(r) => return Ok(r),
                };
            }

            _ => break,
        }
    }

    // --- REVIEWING ---
    let mut reviews = BTreeMap::new();
    if current.status == TaskStatus::Reviewing {
        let diffstat = change_snapshot(&current.worktree_path)?.diff_stat_output;
        let outcome = run_reviewers(
            &adapters.reviewers,
            &current.spec_path,
            &current.worktree_path,
            &paths,
            &diffstat,
        )?;

        match outcome {
            ReviewOutcome::RateLimited { .. } => {
                return pause_rate_limited(
                    store,
                    &log,
                    current,
                    TaskStatus::Reviewing,
                    config.policy.rate_limit_backoff_ms,
                );
            }
            ReviewOutcome::NeedsHuman {
                reason,
                reviews: collected,
            } => {
                reviews = collected;
                let t = transition(
                    current.status,
                    &Signal::ReviewNeedsHuman(reason.clone()),
                    current.retries_remaining,
                );
                current.set_failure_summary(&reason);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) | Persisted::Superseded(r) => r,
                };
            }
            ReviewOutcome::Approved { reviews: collected } => {
                reviews = collected;
                let t = transition(current.status, &Signal::ReviewDone, current.retries_remaining);
                current = match apply(store, &log, current, &t)? {
                    Persisted::Current(r) | Persisted::Superseded(r) => r,
                };
            }
        }
    }

    // A summary is written no matter how the task ended.
    write_summary(&paths, &current, &reviews)?;
    log.info(&format!("task finished with status {}", current.status));
    Ok(current)
}
