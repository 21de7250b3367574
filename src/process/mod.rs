//! Child process driver: PATH lookup, blocking capture, line streaming.

pub mod tmux;

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{FleetError, Result};

/// Callback receiving one trimmed, non-empty output line at a time.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct ProcessRunner;

impl ProcessRunner {
    /// Whether a command resolves on the executable search path.
    pub fn exists(command: &str) -> bool {
        which::which(command).is_ok()
    }

    pub async fn execute(
        command: &str,
        args: &[String],
        work_dir: Option<&Path>,
        envs: &[(String, String)],
    ) -> Result<ExecOutput> {
        debug!(command, args = ?args, "Running command");

        let mut cmd = Command::new(command);
        cmd.args(args).stdin(Stdio::null());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let output = cmd.output().await?;
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command, exit_code, stderr = %stderr, "Command failed");
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
        })
    }

    /// Run a command, delivering stdout and stderr lines to `on_line` as
    /// they arrive. The two streams are read concurrently; lines within
    /// each stream keep their order. Returns the exit code.
    pub async fn execute_streaming(
        command: &str,
        args: &[String],
        work_dir: Option<&Path>,
        on_line: LineSink,
        envs: &[(String, String)],
    ) -> Result<i32> {
        debug!(command, args = ?args, "Running command (streaming)");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FleetError::Other("stdout was not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FleetError::Other("stderr was not piped".into()))?;

        let out_sink = Arc::clone(&on_line);
        let out_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    out_sink(trimmed);
                }
            }
        });

        let err_sink = Arc::clone(&on_line);
        let err_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    err_sink(trimmed);
                }
            }
        });

        let status = child.wait().await?;
        let _ = out_task.await;
        let _ = err_task.await;

        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn exists_resolves_shell_and_rejects_nonsense() {
        assert!(ProcessRunner::exists("sh"));
        assert!(!ProcessRunner::exists("definitely-not-a-real-binary-xyz"));
    }

    #[tokio::test]
    async fn execute_captures_output_and_exit_code() {
        let output = ProcessRunner::execute(
            "sh",
            &["-c".to_string(), "echo hello; echo oops >&2; exit 3".to_string()],
            None,
            &[],
        )
        .await
        .unwrap();

        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn streaming_delivers_both_streams_and_final_partial_line() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let on_line: LineSink = Arc::new(move |line: &str| {
            sink_seen.lock().push(line.to_string());
        });

        // `printf` leaves the last line without a terminating newline.
        let code = ProcessRunner::execute_streaming(
            "sh",
            &[
                "-c".to_string(),
                "echo one; echo two >&2; printf three".to_string(),
            ],
            None,
            on_line,
            &[],
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let mut lines = seen.lock().clone();
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn streaming_skips_blank_lines() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let on_line: LineSink = Arc::new(move |line: &str| {
            sink_seen.lock().push(line.to_string());
        });

        ProcessRunner::execute_streaming(
            "sh",
            &["-c".to_string(), "printf 'a\\n\\n   \\nb\\n'".to_string()],
            None,
            on_line,
            &[],
        )
        .await
        .unwrap();

        assert_eq!(seen.lock().clone(), vec!["a", "b"]);
    }
}
