//! Thin tmux wrapper for attachable task sessions.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::warn;

fn tmux(args: &[&str]) -> Result<std::process::Output> {
    Command::new("tmux")
        .args(args)
        .output()
        .with_context(|| format!("spawn tmux {}", args.join(" ")))
}

/// True if a tmux binary is usable on this machine.
pub fn available() -> bool {
    Command::new("tmux")
        .arg("-V")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Create a detached session rooted in `cwd`. Returns false (without
/// erroring) when tmux refuses, since a session is a convenience only.
pub fn create_session(name: &str, cwd: &Path) -> Result<bool> {
    let cwd_str = cwd.to_string_lossy();
    let output = tmux(&["new-session", "-d", "-s", name, "-c", &cwd_str])?;
    if !output.status.success() {
        warn!(
            session = name,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "failed to create tmux session"
        );
        return Ok(false);
    }
    Ok(true)
}

pub fn session_exists(name: &str) -> Result<bool> {
    Ok(tmux(&["has-session", "-t", name])?.status.success())
}

pub fn kill_session(name: &str) -> Result<()> {
    tmux(&["kill-session", "-t", name])?;
    Ok(())
}
