//! Phase runners consumed by the engine.
//!
//! Every runner classifies its adapter invocation into success, recoverable
//! failure with text, or rate limit before the state machine ever sees it.
//! The engine never interprets raw model output itself.

pub mod executor;
pub mod planner;
pub mod repairer;
pub mod reviewer;

use crate::adapters::AdapterOutcome;

/// Classification shared by the executor and repairer phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Recoverable failure; the text feeds the next repair prompt.
    Failure { error: String },
    RateLimited,
}

/// Map an adapter outcome onto the phase classification, labelling failure
/// text with the phase name.
pub(crate) fn classify(outcome: &AdapterOutcome, phase: &str, excerpt_chars: usize) -> RunOutcome {
    if outcome.rate_limited {
        return RunOutcome::RateLimited;
    }
    if outcome.timed_out {
        return RunOutcome::Failure {
            error: format!("{phase} timed out after {}s", outcome.duration.as_secs()),
        };
    }
    if outcome.exit_code != 0 {
        let combined: String = format!("{}{}", outcome.stdout, outcome.stderr)
            .chars()
            .take(excerpt_chars)
            .collect();
        return RunOutcome::Failure {
            error: format!("{phase} exited {}: {combined}", outcome.exit_code),
        };
    }
    RunOutcome::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(exit_code: i32, timed_out: bool, rate_limited: bool) -> AdapterOutcome {
        AdapterOutcome {
            exit_code,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
            duration: Duration::from_secs(7),
            timed_out,
            rate_limited,
        }
    }

    #[test]
    fn rate_limit_takes_precedence_over_exit_code() {
        let classified = classify(&outcome(1, false, true), "executor", 100);
        assert_eq!(classified, RunOutcome::RateLimited);
    }

    #[test]
    fn timeout_is_a_recoverable_failure_not_a_rate_limit() {
        let RunOutcome::Failure { error } = classify(&outcome(0, true, false), "executor", 100)
        else {
            panic!("expected failure");
        };
        assert!(error.contains("timed out"));
    }

    #[test]
    fn nonzero_exit_carries_output_excerpt() {
        let RunOutcome::Failure { error } = classify(&outcome(2, false, false), "repair agent", 100)
        else {
            panic!("expected failure");
        };
        assert!(error.starts_with("repair agent exited 2"));
        assert!(error.contains("out"));
    }

    #[test]
    fn clean_exit_is_success() {
        assert_eq!(classify(&outcome(0, false, false), "executor", 100), RunOutcome::Success);
    }
}
