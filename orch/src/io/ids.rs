//! Task identifiers and branch names.

use chrono::Utc;
use rand::Rng;

/// Generate a unique task id that sorts by creation time:
/// `20260224T153042-a3f8`.
pub fn generate_task_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let suffix: u16 = rand::thread_rng().r#gen();
    format!("{stamp}-{suffix:04x}")
}

/// Deterministic, git-safe branch name for a task.
pub fn branch_name(task_id: &str) -> String {
    format!("orch/{task_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn task_id_has_sortable_shape() {
        let re = Regex::new(r"^\d{8}T\d{6}-[0-9a-f]{4}$").expect("regex");
        let id = generate_task_id();
        assert!(re.is_match(&id), "unexpected id: {id}");
    }

    #[test]
    fn branch_name_is_namespaced() {
        assert_eq!(branch_name("20260224T153042-a3f8"), "orch/20260224T153042-a3f8");
    }
}
