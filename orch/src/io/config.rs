//! Controller configuration stored under `<repo>/.orch/` (TOML).
//!
//! Three files, each optional, each independently defaulted:
//! `policy.toml` (safety limits), `commands.toml` (verification gates),
//! `models.toml` (role assignments). Global settings live under the orch
//! home directory (`$ORCH_HOME`, default `~/.config/orch`).
//!
//! The merged [`ProjectConfig`] is loaded once and threaded as a value into
//! the engine and the gate; nothing reads configuration from ambient state.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::policy::PolicyConfig;

/// Model CLIs the controller knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelName {
    Claude,
    Codex,
    Gemini,
}

impl ModelName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification command groups, run in lint -> typecheck -> test order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandsConfig {
    pub lint: Vec<String>,
    pub typecheck: Vec<String>,
    pub test: Vec<String>,
}

/// Which model fills each role. Immutable for the life of a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelsConfig {
    pub planner: ModelName,
    pub implementer: ModelName,
    pub reviewers: Vec<ModelName>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            planner: ModelName::Claude,
            implementer: ModelName::Codex,
            reviewers: vec![ModelName::Codex, ModelName::Gemini, ModelName::Claude],
        }
    }
}

/// Machine-wide settings shared by every project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Where task worktrees are created.
    pub worktrees_dir: PathBuf,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            worktrees_dir: orch_home().join("worktrees"),
        }
    }
}

/// Full merged configuration for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub policy: PolicyConfig,
    pub commands: CommandsConfig,
    pub models: ModelsConfig,
    pub global: GlobalConfig,
    pub project_root: PathBuf,
    pub orch_dir: PathBuf,
}

/// Controller home directory: `$ORCH_HOME`, or `~/.config/orch`.
pub fn orch_home() -> PathBuf {
    if let Some(home) = std::env::var_os("ORCH_HOME") {
        return PathBuf::from(home);
    }
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".config").join("orch")
}

/// Canonical location of the task registry.
pub fn registry_path() -> PathBuf {
    orch_home().join("registry.json")
}

/// Load and merge configuration for the repo at `project_root`.
///
/// Fails if `.orch/` does not exist (run `orch init` first); each TOML file
/// within it is optional.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let orch_dir = project_root.join(".orch");
    if !orch_dir.is_dir() {
        return Err(anyhow!(
            "no .orch/ directory found in {} (run `orch init` first)",
            project_root.display()
        ));
    }

    let policy: PolicyConfig = load_toml_or_default(&orch_dir.join("policy.toml"))?;
    let commands: CommandsConfig = load_toml_or_default(&orch_dir.join("commands.toml"))?;
    let models: ModelsConfig = load_toml_or_default(&orch_dir.join("models.toml"))?;
    let global: GlobalConfig = load_toml_or_default(&orch_home().join("global.toml"))?;

    validate_policy(&policy)?;
    if models.reviewers.is_empty() {
        return Err(anyhow!("models.toml must configure at least one reviewer"));
    }

    Ok(ProjectConfig {
        policy,
        commands,
        models,
        global,
        project_root: project_root.to_path_buf(),
        orch_dir,
    })
}

fn validate_policy(policy: &PolicyConfig) -> Result<()> {
    if policy.max_changed_files == 0 {
        return Err(anyhow!("policy.max_changed_files must be > 0"));
    }
    if policy.max_net_loc == 0 {
        return Err(anyhow!("policy.max_net_loc must be > 0"));
    }
    if policy.rate_limit_backoff_ms == 0 {
        return Err(anyhow!("policy.rate_limit_backoff_ms must be > 0"));
    }
    Ok(())
}

fn load_toml_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Scaffold `.orch/` with default config files. Existing files are kept
/// unless `force` is set.
pub fn init_project_config(project_root: &Path, force: bool) -> Result<Vec<PathBuf>> {
    let orch_dir = project_root.join(".orch");
    fs::create_dir_all(&orch_dir).with_context(|| format!("create {}", orch_dir.display()))?;

    let files: [(&str, String); 3] = [
        ("policy.toml", toml::to_string_pretty(&PolicyConfig::default())?),
        ("commands.toml", toml::to_string_pretty(&CommandsConfig::default())?),
        ("models.toml", toml::to_string_pretty(&ModelsConfig::default())?),
    ];

    let mut written = Vec::new();
    for (name, contents) in files {
        let path = orch_dir.join(name);
        if path.exists() && !force {
            continue;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_orch_dir_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_project_config(temp.path()).expect_err("should fail");
        assert!(err.to_string().contains("orch init"));
    }

    #[test]
    fn empty_orch_dir_yields_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join(".orch")).expect("mkdir");
        let config = load_project_config(temp.path()).expect("load");
        assert_eq!(config.policy, PolicyConfig::default());
        assert_eq!(config.models, ModelsConfig::default());
        assert!(config.commands.lint.is_empty());
    }

    #[test]
    fn partial_policy_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let orch_dir = temp.path().join(".orch");
        fs::create_dir(&orch_dir).expect("mkdir");
        fs::write(orch_dir.join("policy.toml"), "max_changed_files = 5\n").expect("write");

        let config = load_project_config(temp.path()).expect("load");
        assert_eq!(config.policy.max_changed_files, 5);
        assert_eq!(config.policy.max_net_loc, PolicyConfig::default().max_net_loc);
    }

    #[test]
    fn init_scaffolds_and_respects_existing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let written = init_project_config(temp.path(), false).expect("init");
        assert_eq!(written.len(), 3);

        fs::write(temp.path().join(".orch/policy.toml"), "max_changed_files = 7\n")
            .expect("write");
        let rewritten = init_project_config(temp.path(), false).expect("init again");
        assert!(rewritten.is_empty());

        let config = load_project_config(temp.path()).expect("load");
        assert_eq!(config.policy.max_changed_files, 7);
    }

    #[test]
    fn model_names_round_trip_lowercase() {
        let models: ModelsConfig =
            toml::from_str("planner = \"gemini\"\nreviewers = [\"claude\"]").expect("parse");
        assert_eq!(models.planner, ModelName::Gemini);
        assert_eq!(models.reviewers, vec![ModelName::Claude]);
        assert_eq!(models.implementer, ModelName::Codex);
    }
}
