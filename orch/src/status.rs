//! Task status table for `orch status`.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::core::fsm::TaskStatus;
use crate::io::store::TaskRecord;

/// Render the status table. Pure: takes records, returns text.
pub fn render_status(tasks: &[TaskRecord], filter: Option<&str>) -> String {
    let filter = filter.map(str::to_uppercase);
    let tasks: Vec<&TaskRecord> = tasks
        .iter()
        .filter(|t| filter.as_deref().is_none_or(|f| t.status.as_str() == f))
        .collect();

    if tasks.is_empty() {
        return match filter {
            Some(f) => format!("No tasks with status {f}.\n"),
            None => "No tasks found. Run `orch run <spec>` in a repo.\n".to_string(),
        };
    }

    let mut out = String::new();
    out.push_str(&format!(
        "\n  {:<22}  {:<14}  {:<8}  REPO\n",
        "TASK ID", "STATUS", "RETRIES"
    ));
    out.push_str(&format!(
        "  {:-<22}  {:-<14}  {:-<8}  {:-<40}\n",
        "", "", "", ""
    ));

    for task in &tasks {
        let retries = format!(
            "{}/{}",
            task.retries_used,
            task.retries_used + task.retries_remaining
        );
        out.push_str(&format!(
            "  {:<22}  {:<14}  {:<8}  {}\n",
            task.task_id,
            task.status.as_str(),
            retries,
            task.repo_path.display()
        ));

        if task.status == TaskStatus::NeedsHuman {
            if let Some(summary) = &task.last_failure_summary {
                let first_line = summary.lines().next().unwrap_or("");
                out.push_str(&format!("    -> {first_line}\n"));
            }
        }
        if task.status == TaskStatus::RateLimited {
            if let Some(retry_after) = task.retry_after {
                let wait = (retry_after - Utc::now()).num_minutes().max(0);
                out.push_str(&format!(
                    "    -> rate limited, resume in ~{wait} min (orch resume)\n"
                ));
            }
        }
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for task in &tasks {
        *counts.entry(task.status.as_str()).or_default() += 1;
    }
    let summary = counts
        .iter()
        .map(|(status, n)| format!("{n} {status}"))
        .collect::<Vec<_>>()
        .join("  ·  ");
    out.push_str(&format!("\n  {summary}\n"));
    out
}
