//! Per-task artifact tree.
//!
//! Everything a human needs to audit a task lands under
//! `artifacts/<task_id>/`: phase logs, per-attempt failure text, reviewer
//! output, the diff stat, and a final summary document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::io::store::TaskRecord;

/// Resolved locations inside one task's artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub logs_dir: PathBuf,
    pub failures_dir: PathBuf,
    pub reviews_dir: PathBuf,
    pub summary_file: PathBuf,
    pub diffstat_file: PathBuf,
}

impl ArtifactPaths {
    pub fn for_task(record: &TaskRecord) -> Self {
        let root = record.artifacts_path.clone();
        Self {
            logs_dir: record.logs_path.clone(),
            failures_dir: root.join("failures"),
            reviews_dir: root.join("reviews"),
            summary_file: root.join("summary.md"),
            diffstat_file: root.join("diffstat.txt"),
            root,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.logs_dir, &self.failures_dir, &self.reviews_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn write_failure(paths: &ArtifactPaths, attempt: u32, content: &str) -> Result<()> {
    write_text(&paths.failures_dir.join(format!("{attempt}.txt")), content)
}

pub fn write_review(paths: &ArtifactPaths, model: &str, content: &str) -> Result<()> {
    write_text(&paths.reviews_dir.join(format!("{model}.md")), content)
}

pub fn write_diffstat(paths: &ArtifactPaths, diffstat: &str) -> Result<()> {
    write_text(&paths.diffstat_file, diffstat)
}

/// Render the human-readable wrap-up for a task in whatever state it ended.
pub fn write_summary(
    paths: &ArtifactPaths,
    record: &TaskRecord,
    reviews: &BTreeMap<String, String>,
) -> Result<()> {
    let mut lines = vec![
        format!("# Task Summary: {}", record.task_id),
        String::new(),
        format!("**Status:** {}", record.status),
        format!("**Repo:** {}", record.repo_path.display()),
        format!("**Branch:** {}", record.branch),
        format!("**Worktree:** {}", record.worktree_path.display()),
        format!("**Spec:** {}", record.spec_path.display()),
        String::new(),
        "## Timeline".to_string(),
        format!("- Created: {}", record.created_at.to_rfc3339()),
        format!("- Updated: {}", record.updated_at.to_rfc3339()),
        String::new(),
        "## Models Used".to_string(),
        format!("- Planner: {}", record.model_used.planner),
        format!("- Implementer: {}", record.model_used.implementer),
        format!(
            "- Reviewers: {}",
            record
                .model_used
                .reviewers
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        String::new(),
        "## Retries".to_string(),
        format!("- Used: {}", record.retries_used),
        format!("- Remaining: {}", record.retries_remaining),
        String::new(),
    ];

    if let Some(failure) = &record.last_failure_summary {
        lines.push("## Last Failure".to_string());
        lines.push(String::new());
        lines.push(failure.clone());
        lines.push(String::new());
    }

    if !reviews.is_empty() {
        lines.push("## Reviews".to_string());
        lines.push(String::new());
        for (model, output) in reviews {
            lines.push(format!("### {model}"));
            lines.push(String::new());
            lines.push(output.clone());
            lines.push(String::new());
        }
    }

    write_text(&paths.summary_file, &lines.join("\n"))
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PolicyConfig;
    use crate::io::config::ModelsConfig;

    fn record_in(root: &Path) -> TaskRecord {
        let mut record = TaskRecord::create(
            "20260806T120000-abcd".to_string(),
            root,
            &root.join("wt"),
            "orch/20260806T120000-abcd".to_string(),
            &root.join("spec.md"),
            &PolicyConfig::default(),
            &ModelsConfig::default(),
        );
        record.set_failure_summary("TOO_MANY_LOC: 612 net LOC changed, limit is 500");
        record
    }

    #[test]
    fn artifact_tree_and_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = record_in(temp.path());
        let paths = ArtifactPaths::for_task(&record);
        paths.ensure_dirs().expect("dirs");

        write_failure(&paths, 0, "executor exited 1").expect("failure");
        write_diffstat(&paths, " 2 files changed").expect("diffstat");

        let mut reviews = BTreeMap::new();
        reviews.insert("codex".to_string(), "LGTM".to_string());
        write_summary(&paths, &record, &reviews).expect("summary");

        let summary = fs::read_to_string(&paths.summary_file).expect("read summary");
        assert!(summary.contains("# Task Summary: 20260806T120000-abcd"));
        assert!(summary.contains("**Status:** PENDING"));
        assert!(summary.contains("## Last Failure"));
        assert!(summary.contains("TOO_MANY_LOC"));
        assert!(summary.contains("### codex"));
        assert!(paths.failures_dir.join("0.txt").exists());
        assert!(paths.diffstat_file.exists());
    }
}
