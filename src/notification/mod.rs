//! Run and agent event notifications.

mod notifier;

pub use notifier::Notifier;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    AgentCompleted,
    AgentFailed,
    WorkspaceKept,
    MergeCompleted,
    MergeFailed,
    RunCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::AgentCompleted => "agent_completed",
            Self::AgentFailed => "agent_failed",
            Self::WorkspaceKept => "workspace_kept",
            Self::MergeCompleted => "merge_completed",
            Self::MergeFailed => "merge_failed",
            Self::RunCompleted => "run_completed",
        }
    }

    /// Run-level events get desktop notifications; per-agent events would
    /// be noise.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            Self::RunStarted | Self::MergeCompleted | Self::MergeFailed | Self::RunCompleted
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetEvent {
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl FleetEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            agent_id: None,
            task_title: None,
            message: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_task(mut self, title: impl Into<String>) -> Self {
        self.task_title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn title(&self) -> String {
        format!("claude-fleet: {}", self.event_type.as_str())
    }

    pub fn body(&self) -> String {
        match (&self.task_title, &self.message) {
            (Some(task), Some(msg)) => format!("{}: {}", task, msg),
            (Some(task), None) => task.clone(),
            (None, Some(msg)) => msg.clone(),
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_events_are_not_run_level() {
        assert!(EventType::RunCompleted.is_run_level());
        assert!(EventType::MergeFailed.is_run_level());
        assert!(!EventType::AgentCompleted.is_run_level());
        assert!(!EventType::WorkspaceKept.is_run_level());
    }

    #[test]
    fn body_joins_task_and_message() {
        let event = FleetEvent::new(EventType::AgentFailed)
            .with_task("Fix login")
            .with_message("tests failed");
        assert_eq!(event.body(), "Fix login: tests failed");
    }
}
