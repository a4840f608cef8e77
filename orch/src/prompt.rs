//! Prompt assembly for each phase. Pure text; no I/O.

use crate::core::policy::PolicyViolation;
use crate::io::config::ModelName;

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Cap on replayed failure text, to keep repair prompts focused.
const FAILURE_EXCERPT_CHARS: usize = 4_000;

/// The planner sees the spec and produces the executor's instructions.
pub fn planner_prompt(spec: &str) -> String {
    let mut parts = vec![format!("[TASK SPEC]\n{}", spec.trim())];
    parts.push(
        "[INSTRUCTION]\n\
         Generate a precise execution plan for a coding agent.\n\
         The coding agent has no project context beyond this plan — give it exact file-level instructions only.\n\
         Specify: which files to create/modify/delete, what logic to implement, what tests to write.\n\
         Output the plan as a structured markdown document."
            .to_string(),
    );
    parts.join(SECTION_SEPARATOR)
}

/// The executor sees only repo conventions and the plan; no background.
pub fn executor_prompt(plan: &str, conventions: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(conventions) = non_empty(conventions) {
        parts.push(format!("[REPO CONVENTIONS]\n{conventions}"));
    }
    parts.push(format!("[TASK]\n{}", plan.trim()));
    parts.push(
        "[INSTRUCTION]\n\
         Implement exactly what is described in [TASK].\n\
         Follow all conventions in [REPO CONVENTIONS].\n\
         Do not invent requirements. Do not change files outside the scope listed.\n\
         Write code changes only. Commit nothing — the controller handles git."
            .to_string(),
    );
    parts.join(SECTION_SEPARATOR)
}

/// Repair adds failure context on top of the executor prompt. When
/// `allowed_files` is non-empty the agent's edit scope narrows to the files
/// the attempt has already touched.
pub fn repair_prompt(
    plan: &str,
    conventions: Option<&str>,
    failure_output: &str,
    violations: &[PolicyViolation],
    retries_remaining: u32,
    allowed_files: &[String],
) -> String {
    let mut parts = Vec::new();
    if let Some(conventions) = non_empty(conventions) {
        parts.push(format!("[REPO CONVENTIONS]\n{conventions}"));
    }
    parts.push(format!("[TASK]\n{}", plan.trim()));

    let excerpt: String = failure_output.chars().take(FAILURE_EXCERPT_CHARS).collect();
    let mut failure_lines = vec!["[PREVIOUS FAILURE]".to_string(), excerpt];
    if !violations.is_empty() {
        failure_lines.push(String::new());
        failure_lines.push("POLICY VIOLATIONS:".to_string());
        for violation in violations {
            failure_lines.push(format!("  - {}: {}", violation.kind, violation.detail));
        }
    }
    failure_lines.push(String::new());
    failure_lines.push(format!(
        "Remaining retries after this attempt: {retries_remaining}"
    ));
    parts.push(failure_lines.join("\n"));

    if !allowed_files.is_empty() {
        let list = allowed_files
            .iter()
            .map(|f| format!("  - {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!(
            "[SCOPE RESTRICTION]\nYou may only edit these files (the controller is enforcing this):\n{list}"
        ));
    }

    parts.push(
        "[INSTRUCTION]\n\
         Fix the failure described above.\n\
         Do not change files outside the allowed scope.\n\
         Do not repeat the same approach that just failed."
            .to_string(),
    );
    parts.join(SECTION_SEPARATOR)
}

/// Each reviewer gets the diff plus a role-specific focus; flagging happens
/// via a `NEEDS_HUMAN:` line in the reviewer's output.
pub fn reviewer_prompt(diffstat: &str, diff: &str, spec: &str, reviewer: ModelName) -> String {
    let focus = match reviewer {
        ModelName::Codex => {
            "Focus on: logic errors, edge cases, missing error handling, race conditions."
        }
        ModelName::Gemini => {
            "Focus on: security vulnerabilities, scalability issues, and suggest specific fixes."
        }
        ModelName::Claude => {
            "Focus on: correctness validation, type safety, and any critical issues only."
        }
    };

    format!(
        "[ORIGINAL TASK SPEC]\n{}\n\n[DIFF STAT]\n{}\n\n[DIFF]\n{}\n\n[INSTRUCTION]\n\
         Review the diff against the original task spec. {focus}\n\
         If anything requires a human decision before merging, output a single line starting\n\
         with 'NEEDS_HUMAN:' followed by a one-sentence reason. Otherwise summarize your findings.",
        spec.trim(),
        diffstat.trim(),
        diff.trim()
    )
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::ViolationKind;

    #[test]
    fn executor_prompt_omits_empty_conventions() {
        let prompt = executor_prompt("do the thing", None);
        assert!(!prompt.contains("[REPO CONVENTIONS]"));
        assert!(prompt.contains("[TASK]\ndo the thing"));

        let prompt = executor_prompt("do the thing", Some("  \n"));
        assert!(!prompt.contains("[REPO CONVENTIONS]"));
    }

    #[test]
    fn repair_prompt_lists_violations_and_scope() {
        let violations = vec![PolicyViolation {
            kind: ViolationKind::ForbiddenPath,
            detail: "file '.env' matches forbidden pattern '.env'".to_string(),
        }];
        let touched = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
        let prompt = repair_prompt("plan", None, "tests failed", &violations, 2, &touched);

        assert!(prompt.contains("FORBIDDEN_PATH"));
        assert!(prompt.contains("[SCOPE RESTRICTION]"));
        assert!(prompt.contains("  - src/a.rs"));
        assert!(prompt.contains("Remaining retries after this attempt: 2"));
    }

    #[test]
    fn repair_prompt_truncates_huge_failures() {
        let failure = "x".repeat(50_000);
        let prompt = repair_prompt("plan", None, &failure, &[], 1, &[]);
        assert!(prompt.len() < 10_000);
    }

    #[test]
    fn reviewer_prompt_varies_by_role() {
        let codex = reviewer_prompt("1 file", "diff", "spec", ModelName::Codex);
        let gemini = reviewer_prompt("1 file", "diff", "spec", ModelName::Gemini);
        assert!(codex.contains("logic errors"));
        assert!(gemini.contains("security vulnerabilities"));
        assert!(codex.contains("NEEDS_HUMAN:"));
    }
}
