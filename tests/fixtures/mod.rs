//! Shared test fixtures: a scripted engine, an in-memory task source, and
//! temp git repository helpers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use claude_fleet::engine::{Engine, EngineOptions, EngineResult};
use claude_fleet::error::Result;
use claude_fleet::tasks::{Task, TaskSource, task_slug};

// --- engine ---

pub type EngineHandler = dyn Fn(&str, &Path) -> EngineResult + Send + Sync;

/// Engine whose behavior is a closure over (prompt, work_dir). Counts calls
/// and records prompts so tests can assert on invocations.
pub struct MockEngine {
    handler: Box<EngineHandler>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new(
        handler: impl Fn(&str, &Path) -> EngineResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Writes a file named after the task and commits it, then succeeds.
    pub fn committing() -> Arc<Self> {
        Self::new(|prompt, work_dir| {
            commit_task_file(prompt, work_dir);
            success_result()
        })
    }

    pub fn failing(error: &str) -> Arc<Self> {
        let error = error.to_string();
        Self::new(move |_, _| EngineResult::failure(error.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn command(&self) -> &'static str {
        "true"
    }

    async fn execute(
        &self,
        prompt: &str,
        work_dir: &Path,
        _options: &EngineOptions,
    ) -> Result<EngineResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        Ok((self.handler)(prompt, work_dir))
    }
}

pub fn success_result() -> EngineResult {
    EngineResult {
        success: true,
        response: "Task completed".into(),
        input_tokens: 10,
        output_tokens: 20,
        cost: None,
        error: None,
    }
}

/// Extract the task title from a runtime-built prompt, write a file derived
/// from it, and commit everything in the workspace.
pub fn commit_task_file(prompt: &str, work_dir: &Path) {
    let title = prompt
        .lines()
        .find_map(|l| l.strip_prefix("# Task: "))
        .unwrap_or("work");
    let file = format!("{}.txt", task_slug(title));
    std::fs::write(work_dir.join(&file), title).unwrap();
    git(work_dir, &["add", "-A"]);
    git(work_dir, &["commit", "-m", &format!("Complete {}", title)]);
}

// --- task source ---

/// In-memory task source with optional parallel groups. The completed set
/// is shared so tests can observe it after the scheduler consumes the
/// source.
pub struct ScriptedTaskSource {
    tasks: Vec<(Task, u32)>,
    completed: Arc<Mutex<HashSet<String>>>,
    grouped: bool,
}

impl ScriptedTaskSource {
    pub fn new(tasks: &[(&str, &str)]) -> Self {
        Self {
            tasks: tasks
                .iter()
                .map(|(id, title)| (Task::new(*id, *title), 0))
                .collect(),
            completed: Arc::new(Mutex::new(HashSet::new())),
            grouped: false,
        }
    }

    pub fn grouped(tasks: &[(&str, &str, u32)]) -> Self {
        Self {
            tasks: tasks
                .iter()
                .map(|(id, title, group)| (Task::new(*id, *title), *group))
                .collect(),
            completed: Arc::new(Mutex::new(HashSet::new())),
            grouped: true,
        }
    }

    /// Handle onto the completed-id set, alive after the source is moved.
    pub fn completed_handle(&self) -> Arc<Mutex<HashSet<String>>> {
        Arc::clone(&self.completed)
    }

    fn remaining(&self) -> Vec<&(Task, u32)> {
        let completed = self.completed.lock();
        self.tasks
            .iter()
            .filter(|(task, _)| !completed.contains(&task.id))
            .collect()
    }
}

impl TaskSource for ScriptedTaskSource {
    fn next_task(&self) -> Option<Task> {
        self.remaining().first().map(|(task, _)| task.clone())
    }

    fn all_tasks(&self) -> Vec<Task> {
        self.remaining()
            .into_iter()
            .map(|(task, _)| task.clone())
            .collect()
    }

    fn parallel_group(&self, title: &str) -> u32 {
        self.tasks
            .iter()
            .find(|(task, _)| task.title == title)
            .map(|(_, group)| *group)
            .unwrap_or(0)
    }

    fn tasks_in_group(&self, group: u32) -> Vec<Task> {
        if group == 0 {
            return Vec::new();
        }
        self.remaining()
            .into_iter()
            .filter(|(_, g)| *g == group)
            .map(|(task, _)| task.clone())
            .collect()
    }

    fn mark_complete(&mut self, id: &str) -> Result<()> {
        self.completed.lock().insert(id.to_string());
        Ok(())
    }

    fn count_remaining(&self) -> usize {
        self.remaining().len()
    }

    fn supports_groups(&self) -> bool {
        self.grouped
    }
}

// --- git helpers ---

/// Run git in `dir`, panicking on failure; returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn git {:?}: {}", args, e));
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a repository on `main` with one commit.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "--initial-branch=main"]);
    git(dir, &["config", "user.email", "fleet@test.local"]);
    git(dir, &["config", "user.name", "Fleet Test"]);
    std::fs::write(dir.join("README.md"), "# test repo\n").unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", "initial commit"]);
}

pub fn current_branch(dir: &Path) -> String {
    git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn branch_exists(dir: &Path, branch: &str) -> bool {
    std::process::Command::new("git")
        .args(["rev-parse", "--verify", &format!("refs/heads/{}", branch)])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
