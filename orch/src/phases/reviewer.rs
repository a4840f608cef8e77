//! Review phase: configured reviewers run in order, first blocking flag wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::adapters::{AdapterRequest, ModelAdapter};
use crate::io::artifacts::{ArtifactPaths, write_review};
use crate::io::worktree::full_diff;
use crate::phases::{RunOutcome, classify};
use crate::prompt::reviewer_prompt;

pub const REVIEWER_TIMEOUT: Duration = Duration::from_secs(120);

const ERROR_EXCERPT_CHARS: usize = 500;

/// The marker a reviewer emits to block the task.
const NEEDS_HUMAN_MARKER: &str = "NEEDS_HUMAN:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Every reviewer completed without flagging.
    Approved { reviews: BTreeMap<String, String> },
    /// A reviewer raised a blocking concern; later reviewers did not run.
    NeedsHuman {
        reason: String,
        reviews: BTreeMap<String, String>,
    },
    RateLimited { reviews: BTreeMap<String, String> },
}

/// Run each reviewer sequentially against the full diff.
#[instrument(skip_all, fields(reviewers = adapters.len()))]
pub fn run_reviewers(
    adapters: &[Box<dyn ModelAdapter>],
    spec_path: &Path,
    worktree: &Path,
    paths: &ArtifactPaths,
    diffstat: &str,
) -> Result<ReviewOutcome> {
    let spec = fs::read_to_string(spec_path)
        .with_context(|| format!("read spec {}", spec_path.display()))?;
    let diff = full_diff(worktree)?;

    let mut reviews = BTreeMap::new();

    for adapter in adapters {
        let model = adapter.name();
        let outcome = adapter.run(&AdapterRequest {
            prompt: reviewer_prompt(diffstat, &diff, &spec, model),
            worktree: worktree.to_path_buf(),
            log_path: paths.logs_dir.join(format!("review-{model}.log")),
            timeout: REVIEWER_TIMEOUT,
        })?;

        match classify(&outcome, "reviewer", ERROR_EXCERPT_CHARS) {
            RunOutcome::RateLimited => {
                return Ok(ReviewOutcome::RateLimited { reviews });
            }
            RunOutcome::Failure { error } => {
                // A reviewer that cannot complete must not silently approve.
                warn!(model = %model, error = %error, "reviewer failed");
                return Ok(ReviewOutcome::NeedsHuman {
                    reason: format!("reviewer {model} could not complete: {error}"),
                    reviews,
                });
            }
            RunOutcome::Success => {}
        }

        let output = outcome.stdout.trim().to_string();
        write_review(paths, model.as_str(), &output)?;
        reviews.insert(model.as_str().to_string(), output.clone());

        if let Some(reason) = extract_needs_human(&output) {
            debug!(model = %model, "reviewer flagged for human");
            return Ok(ReviewOutcome::NeedsHuman { reason, reviews });
        }
    }

    Ok(ReviewOutcome::Approved { reviews })
}

fn extract_needs_human(output: &str) -> Option<String> {
    let (_, rest) = output.split_once(NEEDS_HUMAN_MARKER)?;
    let reason = rest.lines().next().map(str::trim).unwrap_or("");
    if reason.is_empty() {
        Some("reviewer flagged issue".to_string())
    } else {
        Some(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_flag_reason_from_line() {
        let output = "Looked at the diff.\nNEEDS_HUMAN: deletes a database migration\nmore text";
        assert_eq!(
            extract_needs_human(output),
            Some("deletes a database migration".to_string())
        );
    }

    #[test]
    fn missing_marker_yields_none() {
        assert_eq!(extract_needs_human("all good, ship it"), None);
    }

    #[test]
    fn bare_marker_gets_default_reason() {
        assert_eq!(
            extract_needs_human("NEEDS_HUMAN:"),
            Some("reviewer flagged issue".to_string())
        );
    }
}
