//! YAML backlog task source with parallel-group support.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Task, TaskSource, task_slug};
use crate::error::{FleetError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<YamlTask>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    title: String,
    /// Tasks sharing a non-zero group are batched together.
    #[serde(default)]
    group: u32,
    #[serde(default)]
    completed: bool,
}

impl YamlTask {
    fn task_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| task_slug(&self.title))
    }
}

pub struct YamlTaskSource {
    path: PathBuf,
    file: TaskFile,
}

impl YamlTaskSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: TaskFile = serde_yaml_bw::from_str(&content)?;

        debug!(path = %path.display(), total = file.tasks.len(), "Loaded YAML backlog");

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn save(&self) -> Result<()> {
        let content = serde_yaml_bw::to_string(&self.file)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    fn remaining(&self) -> impl Iterator<Item = &YamlTask> {
        self.file.tasks.iter().filter(|t| !t.completed)
    }
}

impl TaskSource for YamlTaskSource {
    fn next_task(&self) -> Option<Task> {
        self.remaining()
            .next()
            .map(|t| Task::new(t.task_id(), &t.title))
    }

    fn all_tasks(&self) -> Vec<Task> {
        self.remaining()
            .map(|t| Task::new(t.task_id(), &t.title))
            .collect()
    }

    fn parallel_group(&self, title: &str) -> u32 {
        self.file
            .tasks
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.group)
            .unwrap_or(0)
    }

    fn tasks_in_group(&self, group: u32) -> Vec<Task> {
        if group == 0 {
            return Vec::new();
        }
        self.remaining()
            .filter(|t| t.group == group)
            .map(|t| Task::new(t.task_id(), &t.title))
            .collect()
    }

    fn mark_complete(&mut self, id: &str) -> Result<()> {
        let task = self
            .file
            .tasks
            .iter_mut()
            .find(|t| t.task_id() == id)
            .ok_or_else(|| FleetError::TaskSource(format!("unknown task id: {}", id)))?;

        task.completed = true;
        self.save()
    }

    fn count_remaining(&self) -> usize {
        self.remaining().count()
    }

    fn supports_groups(&self) -> bool {
        true
    }
}
