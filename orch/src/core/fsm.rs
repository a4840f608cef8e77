//! Task lifecycle state machine.
//!
//! The entire transition table lives in [`transition`]. It is a pure function:
//! no I/O, no side effects, and it always returns a result — a signal that is
//! not valid for the current state escalates to `NeedsHuman` instead of
//! panicking, so the engine always has a safe terminal path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::policy::PolicyViolation;

/// Lifecycle state of a task. Stored verbatim in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Planning,
    Executing,
    Verifying,
    Repairing,
    Reviewing,
    RateLimited,
    Done,
    Failed,
    NeedsHuman,
}

impl TaskStatus {
    /// Terminal states accept no further signals.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::NeedsHuman)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Verifying => "VERIFYING",
            Self::Repairing => "REPAIRING",
            Self::Reviewing => "REVIEWING",
            Self::RateLimited => "RATE_LIMITED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::NeedsHuman => "NEEDS_HUMAN",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every signal the state machine can receive. All deterministic — the engine
/// classifies phase outcomes into these, never raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Start,
    PlanDone,
    ExecDone,
    ExecError(String),
    PolicyFail(Vec<PolicyViolation>),
    VerifyPass,
    VerifyFail(String),
    RepairDone,
    ReviewDone,
    ReviewNeedsHuman(String),
    RetriesExhausted,
    RateLimitHit,
}

impl Signal {
    fn kind(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::PlanDone => "PLAN_DONE",
            Self::ExecDone => "EXEC_DONE",
            Self::ExecError(_) => "EXEC_ERROR",
            Self::PolicyFail(_) => "POLICY_FAIL",
            Self::VerifyPass => "VERIFY_PASS",
            Self::VerifyFail(_) => "VERIFY_FAIL",
            Self::RepairDone => "REPAIR_DONE",
            Self::ReviewDone => "REVIEW_DONE",
            Self::ReviewNeedsHuman(_) => "REVIEW_NEEDS_HUMAN",
            Self::RetriesExhausted => "RETRIES_EXHAUSTED",
            Self::RateLimitHit => "RATE_LIMIT_HIT",
        }
    }
}

/// Advisory action for the engine. The engine decides what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Retry,
    Escalate,
    WaitRateLimit,
    Terminate,
}

/// Result of a single transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: TaskStatus,
    pub action: Action,
    pub reason: String,
}

fn step(next: TaskStatus, action: Action, reason: impl Into<String>) -> Transition {
    Transition {
        next,
        action,
        reason: reason.into(),
    }
}

/// Retry if budget remains, otherwise escalate to a human.
fn retry_or_escalate(retries_remaining: u32, retry_reason: String, exhausted_reason: String) -> Transition {
    if retries_remaining > 0 {
        step(TaskStatus::Repairing, Action::Retry, retry_reason)
    } else {
        step(TaskStatus::NeedsHuman, Action::Escalate, exhausted_reason)
    }
}

/// Compute the next state for `(current, signal, retries_remaining)`.
pub fn transition(current: TaskStatus, signal: &Signal, retries_remaining: u32) -> Transition {
    use TaskStatus as S;

    // Rate limit can fire from any state and never consumes a retry.
    if matches!(signal, Signal::RateLimitHit) {
        return step(
            S::RateLimited,
            Action::WaitRateLimit,
            "model reported rate/usage limit, will resume after backoff",
        );
    }

    match (current, signal) {
        (S::Pending, Signal::Start) => step(S::Planning, Action::Continue, "task started"),

        (S::Planning, Signal::PlanDone) => step(S::Executing, Action::Continue, "plan produced"),
        // Planning failures are not retried: there is no plan to repair against.
        (S::Planning, Signal::ExecError(err)) => step(
            S::Failed,
            Action::Terminate,
            format!("planning failed: {err}"),
        ),

        (S::Executing, Signal::ExecDone) => step(S::Verifying, Action::Continue, "execution complete"),
        (S::Executing, Signal::ExecError(err)) => retry_or_escalate(
            retries_remaining,
            format!("execution error: {err}"),
            format!("execution error, retries exhausted: {err}"),
        ),

        (S::Verifying, Signal::VerifyPass) => step(
            S::Reviewing,
            Action::Continue,
            "all verification gates passed",
        ),
        (S::Verifying, Signal::PolicyFail(violations)) => {
            let detail = violations
                .iter()
                .map(|v| v.detail.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            retry_or_escalate(
                retries_remaining,
                format!("policy violation: {detail}"),
                format!("policy violation, retries exhausted: {detail}"),
            )
        }
        (S::Verifying, Signal::VerifyFail(output)) => {
            let head: String = output.chars().take(200).collect();
            retry_or_escalate(
                retries_remaining,
                format!("verification failed: {head}"),
                "verification failed, retries exhausted".to_string(),
            )
        }

        (S::Repairing, Signal::RepairDone) => step(
            S::Executing,
            Action::Continue,
            "repair attempt ready",
        ),
        (S::Repairing, Signal::RetriesExhausted) => step(
            S::NeedsHuman,
            Action::Escalate,
            "all retries exhausted",
        ),

        (S::Reviewing, Signal::ReviewDone) => step(S::Done, Action::Continue, "all reviewers passed"),
        (S::Reviewing, Signal::ReviewNeedsHuman(reason)) => step(
            S::NeedsHuman,
            Action::Escalate,
            format!("reviewer flagged: {reason}"),
        ),

        // Everything else — including signals arriving in RateLimited or a
        // terminal state — fails safe.
        (state, signal) => step(
            S::NeedsHuman,
            Action::Escalate,
            format!("unexpected signal '{}' in state '{state}'", signal.kind()),
        ),
    }
}
