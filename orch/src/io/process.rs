//! Child processes with timeouts and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured outcome of one child process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Exit code; processes killed by a signal report -1.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Run a command with a timeout, capturing stdout/stderr without risking pipe
/// deadlocks. Output beyond `output_limit_bytes` per stream is discarded while
/// the pipe keeps draining. Expiry kills the child and marks `timed_out`.
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    let start = Instant::now();

    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits before reading its stdin breaks the pipe; that is
        // its answer, not ours to propagate.
        let _ = child_stdin.write_all(input);
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_reader(stdout_handle).context("join stdout")?;
    let stderr = join_reader(stderr_handle).context("join stderr")?;

    let exit_code = status.code().unwrap_or(-1);
    debug!(exit_code, timed_out, "command finished");
    Ok(ProcessOutput {
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
        timed_out,
    })
}

/// Run a full shell command string via `sh -c` in `workdir`.
pub fn run_shell(
    command: &str,
    workdir: &std::path::Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ProcessOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workdir);
    run_with_timeout(cmd, None, timeout, output_limit_bytes)
        .with_context(|| format!("run shell command '{command}'"))
}

fn join_reader(handle: thread::JoinHandle<Result<String>>) -> Result<String> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<String> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    let mut out = String::from_utf8_lossy(&buf).into_owned();
    if truncated > 0 {
        out.push_str(&format!("\n[output truncated {truncated} bytes]\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_shell(
            "echo hello",
            std::path::Path::new("."),
            Duration::from_secs(5),
            10_000,
        )
        .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_not_success() {
        let out = run_shell(
            "exit 3",
            std::path::Path::new("."),
            Duration::from_secs(5),
            10_000,
        )
        .expect("run");
        assert!(!out.success());
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn timeout_kills_and_flags() {
        let out = run_shell(
            "sleep 5",
            std::path::Path::new("."),
            Duration::from_millis(100),
            10_000,
        )
        .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn output_beyond_limit_is_truncated() {
        let out = run_shell(
            "yes x | head -c 100000",
            std::path::Path::new("."),
            Duration::from_secs(5),
            1_000,
        )
        .expect("run");
        assert!(out.stdout.contains("[output truncated"));
        assert!(out.stdout.len() < 2_000);
    }

    #[test]
    fn stdin_is_delivered() {
        let cmd = Command::new("cat");
        let out = run_with_timeout(cmd, Some(b"ping"), Duration::from_secs(5), 1_000).expect("run");
        assert_eq!(out.stdout, "ping");
    }
}
