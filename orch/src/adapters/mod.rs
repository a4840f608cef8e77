//! Model-CLI adapters.
//!
//! The [`ModelAdapter`] trait decouples phase runners from the actual model
//! backend. Tests use scripted adapters that return predetermined outcomes
//! without spawning processes. Real adapters spawn a vendor CLI inside the
//! task's worktree, capture its output, and detect rate-limit phrasing —
//! classification beyond that is the phase runner's job.

pub mod claude;
pub mod codex;
pub mod gemini;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::RegexSet;
use tracing::{debug, instrument};

use crate::io::config::{ModelName, ModelsConfig};
use crate::io::process::run_with_timeout;

const OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// One adapter invocation.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub prompt: String,
    pub worktree: PathBuf,
    /// Combined stdout/stderr log for this invocation.
    pub log_path: PathBuf,
    pub timeout: Duration,
}

/// What came back from the model process.
#[derive(Debug, Clone)]
pub struct AdapterOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// The failure looks like a quota/rate limit, not a real error.
    pub rate_limited: bool,
}

impl AdapterOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Abstraction over model backends.
pub trait ModelAdapter {
    fn name(&self) -> ModelName;
    fn run(&self, request: &AdapterRequest) -> Result<AdapterOutcome>;
}

/// Phrases that indicate a rate/usage limit rather than a real failure.
static RATE_LIMIT_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)rate.?limit",
        r"(?i)quota.?exceeded",
        r"(?i)too.?many.?requests",
        r"429",
        r"(?i)usage.?limit",
        r"(?i)out of credits",
        r"(?i)monthly.?limit",
    ])
    .expect("rate limit patterns")
});

pub fn detect_rate_limit(stdout: &str, stderr: &str) -> bool {
    RATE_LIMIT_PATTERNS.is_match(stdout) || RATE_LIMIT_PATTERNS.is_match(stderr)
}

/// Adapter that spawns a vendor CLI with fixed arguments, passing the prompt
/// as the final `-p` value.
pub struct CliAdapter {
    name: ModelName,
    binary: PathBuf,
    base_args: Vec<String>,
}

impl CliAdapter {
    pub fn new(name: ModelName, binary: PathBuf, base_args: Vec<String>) -> Self {
        Self {
            name,
            binary,
            base_args,
        }
    }
}

impl ModelAdapter for CliAdapter {
    fn name(&self) -> ModelName {
        self.name
    }

    #[instrument(skip_all, fields(model = %self.name, timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &AdapterRequest) -> Result<AdapterOutcome> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.base_args)
            .arg("-p")
            .arg(&request.prompt)
            .current_dir(&request.worktree);

        let output = run_with_timeout(cmd, None, request.timeout, OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run {} adapter", self.name))?;

        write_invocation_log(&request.log_path, &output.stdout, &output.stderr, output.timed_out)?;

        debug!(exit_code = output.exit_code, timed_out = output.timed_out, "adapter finished");
        Ok(AdapterOutcome {
            rate_limited: detect_rate_limit(&output.stdout, &output.stderr),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            duration: output.duration,
            timed_out: output.timed_out,
        })
    }
}

fn write_invocation_log(path: &Path, stdout: &str, stderr: &str, timed_out: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(stdout);
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(stderr);
    if timed_out {
        buf.push_str("\n[adapter timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

/// Locate a vendor binary: `ORCH_<NAME>_BIN`, then `~/.local/bin`, then PATH.
pub(crate) fn resolve_binary(name: ModelName) -> Result<PathBuf> {
    let env_var = format!("ORCH_{}_BIN", name.as_str().to_uppercase());
    if let Some(path) = std::env::var_os(&env_var) {
        return Ok(PathBuf::from(path));
    }

    if let Some(home) = std::env::var_os("HOME") {
        let local = PathBuf::from(home).join(".local").join("bin").join(name.as_str());
        if local.is_file() {
            return Ok(local);
        }
    }

    let which = Command::new("which")
        .arg(name.as_str())
        .output()
        .context("spawn which")?;
    if which.status.success() {
        let path = String::from_utf8_lossy(&which.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    Err(anyhow!(
        "model adapter '{name}' could not find its binary; set {env_var} or ensure the CLI is on PATH"
    ))
}

/// Build the adapter for a configured model.
pub fn adapter_for(name: ModelName) -> Result<Box<dyn ModelAdapter>> {
    let adapter = match name {
        ModelName::Claude => claude::adapter()?,
        ModelName::Codex => codex::adapter()?,
        ModelName::Gemini => gemini::adapter()?,
    };
    Ok(Box::new(adapter))
}

/// The three role adapters a task runs with, resolved once at startup.
pub struct AdapterSet {
    pub planner: Box<dyn ModelAdapter>,
    pub implementer: Box<dyn ModelAdapter>,
    pub reviewers: Vec<Box<dyn ModelAdapter>>,
}

impl AdapterSet {
    pub fn from_models(models: &ModelsConfig) -> Result<Self> {
        Ok(Self {
            planner: adapter_for(models.planner)?,
            implementer: adapter_for(models.implementer)?,
            reviewers: models
                .reviewers
                .iter()
                .map(|&name| adapter_for(name))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rate_limit_phrases() {
        assert!(detect_rate_limit("Rate limit exceeded, retry later", ""));
        assert!(detect_rate_limit("", "HTTP 429 Too Many Requests"));
        assert!(detect_rate_limit("You have hit your usage limit.", ""));
        assert!(detect_rate_limit("quota exceeded for this month", ""));
        assert!(detect_rate_limit("out of credits", ""));
    }

    #[test]
    fn plain_failures_are_not_rate_limits() {
        assert!(!detect_rate_limit("error: compilation failed", ""));
        assert!(!detect_rate_limit("", "panic: index out of bounds"));
        assert!(!detect_rate_limit("", ""));
    }
}
