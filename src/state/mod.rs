//! Process-wide run state: agent records, summary totals, persistence.
//!
//! The registry is observability, not truth: every mutation rewrites the
//! state file so dashboards can follow a run, and write failures are
//! swallowed. All mutations funnel through the registry's update methods,
//! serialized by one mutex.

mod progress;

pub use progress::ProgressLog;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::process::tmux;

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub task_title: String,
    pub status: AgentStatus,
    /// Human-readable label for what the agent is doing right now.
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_update: String,
}

impl AgentRecord {
    fn new() -> Self {
        Self {
            task_title: String::new(),
            status: AgentStatus::Pending,
            step: "Initializing".to_string(),
            tmux_session: None,
            workspace_dir: None,
            error: None,
            last_update: now_iso(),
        }
    }
}

/// Partial update applied to an agent record; unset fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct AgentPatch {
    pub task_title: Option<String>,
    pub status: Option<AgentStatus>,
    pub step: Option<String>,
    pub tmux_session: Option<String>,
    pub workspace_dir: Option<String>,
    pub error: Option<String>,
}

impl AgentPatch {
    pub fn step(step: impl Into<String>) -> Self {
        Self {
            step: Some(step.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSummary {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_progress: u64,
}

/// Partial update applied to the summary; unset fields are untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryPatch {
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub failed: Option<u64>,
    pub in_progress: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetState {
    pub agents: BTreeMap<String, AgentRecord>,
    pub summary: RunSummary,
    pub last_update: String,
}

pub struct StateRegistry {
    state: Mutex<FleetState>,
    path: PathBuf,
}

impl StateRegistry {
    pub fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FleetState::default()),
            path,
        })
    }

    /// Read a previously persisted state file, e.g. for status display.
    pub fn read_file(path: &Path) -> Option<FleetState> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn update_agent(&self, id: &str, patch: AgentPatch) {
        let mut state = self.state.lock();
        let record = state
            .agents
            .entry(id.to_string())
            .or_insert_with(AgentRecord::new);

        if let Some(title) = patch.task_title {
            record.task_title = title;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(step) = patch.step {
            record.step = step;
        }
        if let Some(session) = patch.tmux_session {
            record.tmux_session = Some(session);
        }
        if let Some(dir) = patch.workspace_dir {
            record.workspace_dir = Some(dir);
        }
        if let Some(error) = patch.error {
            record.error = Some(error);
        }

        let stamp = now_iso();
        record.last_update = stamp.clone();
        state.last_update = stamp;
        self.persist(&state);
    }

    pub fn update_summary(&self, patch: SummaryPatch) {
        let mut state = self.state.lock();
        if let Some(total) = patch.total {
            state.summary.total = total;
        }
        if let Some(completed) = patch.completed {
            state.summary.completed = completed;
        }
        if let Some(failed) = patch.failed {
            state.summary.failed = failed;
        }
        if let Some(in_progress) = patch.in_progress {
            state.summary.in_progress = in_progress;
        }
        state.last_update = now_iso();
        self.persist(&state);
    }

    pub fn remove_agent(&self, id: &str) {
        let mut state = self.state.lock();
        state.agents.remove(id);
        state.last_update = now_iso();
        self.persist(&state);
    }

    pub fn snapshot(&self) -> FleetState {
        self.state.lock().clone()
    }

    /// Kill the tmux session of every agent that has not reached a terminal
    /// state. Best effort and idempotent; wired to SIGINT and SIGTERM.
    pub async fn cleanup_tmux_sessions(&self) {
        let sessions: Vec<String> = {
            let state = self.state.lock();
            state
                .agents
                .values()
                .filter(|record| !record.status.is_terminal())
                .filter_map(|record| record.tmux_session.clone())
                .collect()
        };

        for session in sessions {
            tmux::kill_session(&session).await;
        }
    }

    /// Rewrite the state file; called with the state lock held so the file
    /// never trails the in-memory document. Failures are swallowed.
    fn persist(&self, state: &FleetState) {
        let content = match serde_json::to_string_pretty(state) {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Failed to serialize state");
                return;
            }
        };

        // tmp + rename keeps readers from ever seeing a half-written file.
        let tmp_path = self.path.with_extension("json.tmp");
        let result = std::fs::write(&tmp_path, content)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));

        match result {
            Ok(()) => debug!(path = %self.path.display(), "State persisted"),
            Err(e) => warn!(error = %e, "Failed to write state file"),
        }
    }
}

/// Install the interrupt/terminate handler: clean up multiplexer sessions,
/// then exit with status 0.
pub fn spawn_signal_cleanup(registry: Arc<StateRegistry>) {
    tokio::spawn(async move {
        wait_for_termination().await;
        warn!("Received termination signal, cleaning up tmux sessions");
        registry.cleanup_tmux_sessions().await;
        std::process::exit(0);
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> Arc<StateRegistry> {
        StateRegistry::new(dir.path().join("state.json"))
    }

    #[test]
    fn first_patch_creates_record_with_defaults() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.update_agent(
            "1",
            AgentPatch {
                task_title: Some("Fix login".into()),
                ..Default::default()
            },
        );

        let state = registry.snapshot();
        let record = &state.agents["1"];
        assert_eq!(record.task_title, "Fix login");
        assert_eq!(record.status, AgentStatus::Pending);
        assert_eq!(record.step, "Initializing");
        assert!(record.error.is_none());
    }

    #[test]
    fn patches_merge_without_clearing_other_fields() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.update_agent(
            "1",
            AgentPatch {
                task_title: Some("Fix login".into()),
                status: Some(AgentStatus::Running),
                workspace_dir: Some("/tmp/ws".into()),
                ..Default::default()
            },
        );
        registry.update_agent("1", AgentPatch::step("Implementing"));

        let record = &registry.snapshot().agents["1"];
        assert_eq!(record.status, AgentStatus::Running);
        assert_eq!(record.step, "Implementing");
        assert_eq!(record.workspace_dir.as_deref(), Some("/tmp/ws"));
    }

    #[test]
    fn persisted_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.update_agent(
            "3",
            AgentPatch {
                task_title: Some("Add logout".into()),
                status: Some(AgentStatus::Completed),
                step: Some("Finished".into()),
                ..Default::default()
            },
        );
        registry.update_summary(SummaryPatch {
            total: Some(4),
            completed: Some(1),
            ..Default::default()
        });

        let reread = StateRegistry::read_file(&dir.path().join("state.json")).unwrap();
        assert_eq!(reread, registry.snapshot());
        assert_eq!(reread.summary.total, 4);
        assert_eq!(reread.summary.completed, 1);
    }

    #[test]
    fn state_file_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.update_agent(
            "1",
            AgentPatch {
                task_title: Some("T".into()),
                ..Default::default()
            },
        );
        registry.update_summary(SummaryPatch {
            in_progress: Some(2),
            ..Default::default()
        });

        let content = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
        assert!(content.contains("\"taskTitle\""));
        assert!(content.contains("\"inProgress\""));
        assert!(content.contains("\"lastUpdate\""));
    }

    #[test]
    fn remove_agent_deletes_the_record() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.update_agent("1", AgentPatch::step("x"));
        registry.remove_agent("1");
        assert!(registry.snapshot().agents.is_empty());
    }

    #[test]
    fn write_errors_are_swallowed() {
        // Point the state file at a path whose parent does not exist.
        let registry = StateRegistry::new(PathBuf::from("/nonexistent-dir/state.json"));
        registry.update_agent("1", AgentPatch::step("x"));
        assert_eq!(registry.snapshot().agents.len(), 1);
    }
}
