//! Markdown checklist task source: `- [ ] Title` lines in a tasks file.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Task, TaskSource, task_slug};
use crate::error::{FleetError, Result};

struct Item {
    line_idx: usize,
    id: String,
    title: String,
    done: bool,
}

pub struct MarkdownTaskSource {
    path: PathBuf,
    lines: Vec<String>,
    items: Vec<Item>,
}

impl MarkdownTaskSource {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let lines: Vec<String> = content.lines().map(str::to_string).collect();

        let mut items = Vec::new();
        for (line_idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            let (done, rest) = if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
                (false, rest)
            } else if let Some(rest) = trimmed.strip_prefix("- [x] ") {
                (true, rest)
            } else {
                continue;
            };

            let title = rest.trim().to_string();
            if title.is_empty() {
                continue;
            }
            items.push(Item {
                line_idx,
                id: task_slug(&title),
                title,
                done,
            });
        }

        debug!(path = %path.display(), total = items.len(), "Loaded markdown checklist");

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            items,
        })
    }

    fn save(&self) -> Result<()> {
        let mut content = self.lines.join("\n");
        content.push('\n');
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl TaskSource for MarkdownTaskSource {
    fn next_task(&self) -> Option<Task> {
        self.items
            .iter()
            .find(|i| !i.done)
            .map(|i| Task::new(&i.id, &i.title))
    }

    fn all_tasks(&self) -> Vec<Task> {
        self.items
            .iter()
            .filter(|i| !i.done)
            .map(|i| Task::new(&i.id, &i.title))
            .collect()
    }

    fn parallel_group(&self, _title: &str) -> u32 {
        0
    }

    fn tasks_in_group(&self, _group: u32) -> Vec<Task> {
        Vec::new()
    }

    fn mark_complete(&mut self, id: &str) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| FleetError::TaskSource(format!("unknown task id: {}", id)))?;

        item.done = true;
        let line = &mut self.lines[item.line_idx];
        *line = line.replacen("- [ ]", "- [x]", 1);
        self.save()
    }

    fn count_remaining(&self) -> usize {
        self.items.iter().filter(|i| !i.done).count()
    }
}
