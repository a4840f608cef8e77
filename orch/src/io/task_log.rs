//! Per-task log handle.
//!
//! Each task gets its own handle writing to `logs/orchestrator.log`, so
//! concurrent tasks never interleave lines in a shared file. Tracing remains
//! the dev-diagnostics channel (`RUST_LOG`); this file is a product artifact
//! and is always written.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Appending logger scoped to one task.
#[derive(Debug, Clone)]
pub struct TaskLog {
    path: PathBuf,
    task_id: String,
}

impl TaskLog {
    pub fn new(logs_dir: &Path, task_id: &str) -> Self {
        Self {
            path: logs_dir.join("orchestrator.log"),
            task_id: task_id.to_string(),
        }
    }

    pub fn info(&self, message: &str) {
        tracing::info!(task = %self.task_id, "{message}");
        self.append(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(task = %self.task_id, "{message}");
        self.append(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(task = %self.task_id, "{message}");
        self.append(Level::Error, message);
    }

    fn append(&self, level: Level, message: &str) {
        let line = format!(
            "{} {} [{}] {message}\n",
            Utc::now().to_rfc3339(),
            level.as_str(),
            self.task_id
        );
        // A log-write failure must never take down the controller.
        if let Err(err) = self.try_append(&line) {
            warn!(err = %err, path = %self.path.display(), "task log write failed");
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
