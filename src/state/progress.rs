//! Append-only record of task outcomes across a run.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn record_completed(&self, task_title: &str, agent_id: &str) {
        self.append("done", task_title, agent_id).await;
    }

    pub async fn record_failed(&self, task_title: &str, agent_id: &str) {
        self.append("failed", task_title, agent_id).await;
    }

    async fn append(&self, outcome: &str, task_title: &str, agent_id: &str) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!(
            "[{}] {}: {} (agent {})\n",
            timestamp, outcome, task_title, agent_id
        );

        if let Some(parent) = self.path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!(error = %e, "Failed to create progress log directory");
            return;
        }

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await;

        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(error = %e, "Failed to write progress log");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to open progress log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn outcomes_append_in_order() {
        let dir = TempDir::new().unwrap();
        let log = ProgressLog::new(dir.path().join("progress.log"));

        log.record_completed("Fix login", "1").await;
        log.record_failed("Add logout", "2").await;

        let content = tokio::fs::read_to_string(dir.path().join("progress.log"))
            .await
            .unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("done: Fix login (agent 1)"));
        assert!(lines[1].contains("failed: Add logout (agent 2)"));
    }
}
