//! Terminal-multiplexer process driver.
//!
//! Runs an agent command inside a detached tmux session so a human can
//! attach to it while it runs, and after it fails. The session's command
//! pipes merged output through `tee` into an output file and records the
//! command's exit status in a sibling exit file; the driver polls both at
//! 1 Hz. A non-zero exit status holds the session open with a debug banner
//! until it is killed externally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{LineSink, ProcessRunner};
use crate::error::{FleetError, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a failed session sleeps before giving up on being inspected.
const HOLD_SECS: u64 = 2_147_483_647;

#[derive(Debug)]
pub struct TmuxExecution {
    /// Full contents of the output file (stdout and stderr were merged).
    pub stdout: String,
    pub exit_code: i32,
}

/// `<prefix>-<agentId>-<taskSlug>`, lower-cased, with every character
/// outside `[A-Za-z0-9-]` replaced by `-`.
pub fn session_name(prefix: &str, agent_id: &str, task_slug: &str) -> String {
    format!("{}-{}-{}", prefix, agent_id, task_slug)
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Single-quote a string for /bin/sh, escaping embedded quotes as `'\''`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Splits a byte stream into trimmed, non-empty lines, carrying partial
/// trailing content between reads.
#[derive(Default)]
pub struct LineSplitter {
    pending: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        lines
    }

    /// Trailing content without a terminating newline, emitted at stream end.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

fn wrapper_script(
    command: &str,
    args: &[String],
    out_file: &Path,
    exit_file: &Path,
    session: &str,
) -> String {
    let mut quoted = vec![shell_quote(command)];
    quoted.extend(args.iter().map(|a| shell_quote(a)));
    let target = quoted.join(" ");

    let out = shell_quote(&out_file.display().to_string());
    let exit = shell_quote(&exit_file.display().to_string());

    // The subshell writes the target command's own exit status before tee
    // finishes; plain `$?` after the pipeline would report tee's status.
    format!(
        "( {target} 2>&1; echo $? > {exit} ) | tee {out}; \
         status=$(cat {exit} 2>/dev/null || echo 1); \
         if [ \"$status\" -ne 0 ]; then \
         printf '\\n[claude-fleet] agent exited with status %s\\n' \"$status\"; \
         printf 'session %s is held open for inspection; kill it when done\\n' {session_q}; \
         exec sleep {hold}; fi",
        target = target,
        exit = exit,
        out = out,
        session_q = shell_quote(session),
        hold = HOLD_SECS,
    )
}

pub async fn has_session(name: &str) -> bool {
    ProcessRunner::execute("tmux", &["has-session".into(), "-t".into(), name.into()], None, &[])
        .await
        .map(|o| o.success())
        .unwrap_or(false)
}

/// Best-effort session kill; used by state cleanup and signal handlers.
pub async fn kill_session(name: &str) {
    match ProcessRunner::execute(
        "tmux",
        &["kill-session".into(), "-t".into(), name.into()],
        None,
        &[],
    )
    .await
    {
        Ok(output) if output.success() => debug!(session = name, "Killed tmux session"),
        Ok(_) => debug!(session = name, "tmux session already gone"),
        Err(e) => warn!(session = name, error = %e, "Failed to kill tmux session"),
    }
}

/// Run `command args` inside a detached session named `session`, polling its
/// output into `on_line` until the exit file appears. A session that
/// disappears without writing the exit file yields exit code 1.
pub async fn run_in_session(
    session: &str,
    command: &str,
    args: &[String],
    work_dir: &Path,
    tmp_dir: &Path,
    on_line: &LineSink,
) -> Result<TmuxExecution> {
    if !ProcessRunner::exists("tmux") {
        return Err(FleetError::Other("tmux not found on PATH".into()));
    }

    fs::create_dir_all(tmp_dir).await?;
    let out_file: PathBuf = tmp_dir.join(format!("{}.out", session));
    let exit_file: PathBuf = tmp_dir.join(format!("{}.exit", session));
    let _ = fs::remove_file(&out_file).await;
    let _ = fs::remove_file(&exit_file).await;

    let script = wrapper_script(command, args, &out_file, &exit_file, session);
    let launch = ProcessRunner::execute(
        "tmux",
        &[
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            session.into(),
            "-c".into(),
            work_dir.display().to_string(),
            script,
        ],
        None,
        &[],
    )
    .await?;

    if !launch.success() {
        return Err(FleetError::Other(format!(
            "failed to start tmux session {}: {}",
            session,
            launch.stderr.trim()
        )));
    }

    debug!(session, "Started tmux session");

    let mut offset = 0usize;
    let mut splitter = LineSplitter::new();

    let exit_code = loop {
        sleep(POLL_INTERVAL).await;

        offset = drain_output(&out_file, offset, &mut splitter, on_line).await;

        if let Ok(content) = fs::read_to_string(&exit_file).await {
            if let Ok(code) = content.trim().parse::<i32>() {
                break code;
            }
            // Partially written exit file; pick it up next tick.
            continue;
        }

        if !has_session(session).await {
            warn!(session, "tmux session vanished without an exit file");
            break 1;
        }
    };

    // Final drain for bytes written between the last tick and termination.
    drain_output(&out_file, offset, &mut splitter, on_line).await;
    if let Some(rest) = splitter.flush() {
        on_line(&rest);
    }

    let stdout = fs::read_to_string(&out_file).await.unwrap_or_default();
    Ok(TmuxExecution { stdout, exit_code })
}

async fn drain_output(
    out_file: &Path,
    offset: usize,
    splitter: &mut LineSplitter,
    on_line: &LineSink,
) -> usize {
    let Ok(data) = fs::read(out_file).await else {
        return offset;
    };
    if data.len() <= offset {
        return offset;
    }
    for line in splitter.push(&data[offset..]) {
        on_line(&line);
    }
    data.len()
}
