//! Batched parallel scheduler.
//!
//! Drains a task source in batches of up to `max_parallel` tasks, fans each
//! batch out to concurrently running agent runtimes, processes results in
//! launch order, then drives the merge pipeline and restores the starting
//! branch.

mod merge;

pub use merge::{MergePipeline, MergeReport};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::agent::{AgentOutcome, AgentRuntime, AgentSettings, PromptFlags, RequirementSource, RetryPolicy};
use crate::config::ProjectPaths;
use crate::engine::Engine;
use crate::error::{FleetError, Result};
use crate::git::GitRunner;
use crate::notification::{EventType, FleetEvent, Notifier};
use crate::state::{ProgressLog, StateRegistry, SummaryPatch};
use crate::tasks::{Task, TaskSource};
use crate::workspace::WorkspaceProvider;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub skip_tests: bool,
    pub skip_lint: bool,
    pub dry_run: bool,
    /// 0 means no batch limit.
    pub max_iterations: u32,
    pub retry: RetryPolicy,
    /// Merge target; `None` or empty means the branch the run started on.
    pub base_branch: Option<String>,
    pub max_parallel: usize,
    pub requirements: Option<RequirementSource>,
    pub browser: bool,
    pub model_override: Option<String>,
    pub skip_merge: bool,
    pub tmux: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            skip_tests: false,
            skip_lint: false,
            dry_run: false,
            max_iterations: 0,
            retry: RetryPolicy::default(),
            base_branch: None,
            max_parallel: 3,
            requirements: None,
            browser: false,
            model_override: None,
            skip_merge: false,
            tmux: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: u64,
    pub failed: u64,
    pub merged: Vec<String>,
    pub merge_failed: Vec<String>,
}

pub struct Scheduler {
    engine: Arc<dyn Engine>,
    source: Box<dyn TaskSource>,
    provider: Arc<dyn WorkspaceProvider>,
    registry: Arc<StateRegistry>,
    notifier: Notifier,
    progress: ProgressLog,
    work_dir: PathBuf,
    options: RunOptions,
}

impl Scheduler {
    pub fn new(
        engine: Arc<dyn Engine>,
        source: Box<dyn TaskSource>,
        provider: Arc<dyn WorkspaceProvider>,
        registry: Arc<StateRegistry>,
        notifier: Notifier,
        paths: &ProjectPaths,
        options: RunOptions,
    ) -> Self {
        Self {
            engine,
            source,
            provider,
            registry,
            notifier,
            progress: ProgressLog::new(paths.progress_file.clone()),
            work_dir: paths.root.clone(),
            options,
        }
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        if self.options.max_parallel == 0 {
            return Err(FleetError::Config("max_parallel must be at least 1".into()));
        }

        let workspace_base = self.provider.base(&self.work_dir);
        let git = GitRunner::new(&self.work_dir);
        let starting_branch = git.current_branch().await?;
        let base_branch = self
            .options
            .base_branch
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| starting_branch.clone());

        info!(
            starting_branch = %starting_branch,
            base_branch = %base_branch,
            max_parallel = self.options.max_parallel,
            "Starting run"
        );
        self.notifier
            .notify(
                &FleetEvent::new(EventType::RunStarted)
                    .with_message(format!("merging into {}", base_branch)),
            )
            .await;

        let runtime = Arc::new(AgentRuntime::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            Arc::clone(&self.registry),
            AgentSettings {
                work_dir: self.work_dir.clone(),
                workspace_base,
                base_branch: base_branch.clone(),
                requirements: self.options.requirements.clone(),
                prompt_flags: PromptFlags {
                    skip_tests: self.options.skip_tests,
                    skip_lint: self.options.skip_lint,
                    browser: self.options.browser,
                },
                retry: self.options.retry,
                tmux: self.options.tmux,
                model_override: self.options.model_override.clone(),
            },
        ));

        let mut completed_branches: Vec<String> = Vec::new();
        let mut failed_task_ids: HashSet<String> = HashSet::new();
        let mut global_agent_num: u64 = 0;
        let mut iteration: u32 = 0;
        let mut completed_count: u64 = 0;
        let mut failed_count: u64 = 0;

        loop {
            if self.options.max_iterations > 0 && iteration >= self.options.max_iterations {
                info!(iteration, "Reached max iterations, stopping");
                break;
            }

            let selected = self.select_batch();
            let selected_len = selected.len();
            let batch: Vec<Task> = selected
                .into_iter()
                .filter(|t| !failed_task_ids.contains(&t.id))
                .collect();

            if batch.is_empty() {
                if selected_len > 0 {
                    warn!("Some tasks are still pending but previously failed; stopping");
                } else {
                    info!("All tasks complete");
                }
                break;
            }

            if iteration == 0 {
                self.registry.update_summary(SummaryPatch {
                    total: Some(self.source.count_remaining() as u64),
                    ..Default::default()
                });
            }

            let batch: Vec<Task> = batch
                .into_iter()
                .take(self.options.max_parallel)
                .collect();
            iteration += 1;
            self.registry.update_summary(SummaryPatch {
                in_progress: Some(batch.len() as u64),
                ..Default::default()
            });

            if self.options.dry_run {
                for task in &batch {
                    info!(task = %task.title, "Would launch agent (dry run)");
                }
                // Nothing completes in a dry run; an unbounded loop would
                // re-select the same batch forever.
                if self.options.max_iterations == 0 {
                    break;
                }
                continue;
            }

            let launched: Vec<(Task, u64)> = batch
                .into_iter()
                .map(|task| {
                    global_agent_num += 1;
                    (task, global_agent_num)
                })
                .collect();

            let handles: Vec<_> = launched
                .iter()
                .map(|(task, agent_num)| {
                    let rt = Arc::clone(&runtime);
                    let task = task.clone();
                    let agent_num = *agent_num;
                    tokio::spawn(async move { rt.run(task, agent_num).await })
                })
                .collect();

            // Barrier: the whole batch finishes before any result is
            // processed, in launch order.
            let joined = join_all(handles).await;

            for ((task, agent_num), result) in launched.into_iter().zip(joined) {
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(agent = agent_num, error = %e, "Agent task panicked");
                        AgentOutcome {
                            task,
                            agent_id: agent_num.to_string(),
                            workspace_dir: None,
                            branch_name: None,
                            result: Err(FleetError::Other(format!("agent panicked: {}", e))),
                        }
                    }
                };

                self.process_outcome(
                    outcome,
                    &mut completed_branches,
                    &mut failed_task_ids,
                    &mut completed_count,
                    &mut failed_count,
                )
                .await;
            }
        }

        self.registry.update_summary(SummaryPatch {
            in_progress: Some(0),
            ..Default::default()
        });

        let mut report = RunReport {
            completed: completed_count,
            failed: failed_count,
            ..Default::default()
        };

        if !self.options.skip_merge && !self.options.dry_run && !completed_branches.is_empty() {
            let pipeline = MergePipeline::new(self.engine.as_ref(), &self.work_dir, &self.notifier);
            let merge_report = pipeline.merge_all(&completed_branches, &base_branch).await?;
            report.merged = merge_report.merged;
            report.merge_failed = merge_report.failed;
        }

        let current = git.current_branch().await?;
        if current != starting_branch {
            match git.checkout(&starting_branch).await {
                Ok(()) => info!(branch = %starting_branch, "Returned to starting branch"),
                Err(e) => warn!(branch = %starting_branch, error = %e, "Failed to restore starting branch"),
            }
        }

        self.notifier
            .notify(&FleetEvent::new(EventType::RunCompleted).with_message(format!(
                "{} completed, {} failed, {} merged",
                report.completed,
                report.failed,
                report.merged.len()
            )))
            .await;

        Ok(report)
    }

    /// Pick the next batch: grouped sources yield one task's whole parallel
    /// group (or a singleton), others are drained all at once.
    fn select_batch(&self) -> Vec<Task> {
        if !self.source.supports_groups() {
            return self.source.all_tasks();
        }

        let Some(task) = self.source.next_task() else {
            return Vec::new();
        };

        let group = self.source.parallel_group(&task.title);
        if group > 0 {
            let tasks = self.source.tasks_in_group(group);
            if !tasks.is_empty() {
                return tasks;
            }
        }
        vec![task]
    }

    async fn process_outcome(
        &mut self,
        outcome: AgentOutcome,
        completed_branches: &mut Vec<String>,
        failed_task_ids: &mut HashSet<String>,
        completed_count: &mut u64,
        failed_count: &mut u64,
    ) {
        if outcome.succeeded() {
            if let Err(e) = self.source.mark_complete(&outcome.task.id) {
                warn!(task = %outcome.task.id, error = %e, "Failed to mark task complete in source");
            }
            self.progress
                .record_completed(&outcome.task.title, &outcome.agent_id)
                .await;
            *completed_count += 1;
            self.registry.update_summary(SummaryPatch {
                completed: Some(*completed_count),
                ..Default::default()
            });
            info!(agent = %outcome.agent_id, task = %outcome.task.title, "Task completed");
            self.notifier
                .notify(
                    &FleetEvent::new(EventType::AgentCompleted)
                        .with_agent(&outcome.agent_id)
                        .with_task(&outcome.task.title),
                )
                .await;

            if let Some(branch) = &outcome.branch_name
                && !branch.is_empty()
            {
                completed_branches.push(branch.clone());
            }
        } else {
            let message = outcome.error_message().unwrap_or_default();
            error!(
                agent = %outcome.agent_id,
                task = %outcome.task.title,
                error = %message,
                "Task failed"
            );
            self.progress
                .record_failed(&outcome.task.title, &outcome.agent_id)
                .await;
            *failed_count += 1;
            self.registry.update_summary(SummaryPatch {
                failed: Some(*failed_count),
                ..Default::default()
            });
            failed_task_ids.insert(outcome.task.id.clone());
            self.notifier
                .notify(
                    &FleetEvent::new(EventType::AgentFailed)
                        .with_agent(&outcome.agent_id)
                        .with_task(&outcome.task.title)
                        .with_message(&message),
                )
                .await;
        }

        let (Some(workspace_dir), Some(branch_name)) =
            (&outcome.workspace_dir, &outcome.branch_name)
        else {
            return;
        };

        if self.options.tmux && !outcome.succeeded() {
            warn!(
                agent = %outcome.agent_id,
                path = %workspace_dir.display(),
                "Workspace preserved for debugging"
            );
            self.notifier
                .notify(
                    &FleetEvent::new(EventType::WorkspaceKept)
                        .with_agent(&outcome.agent_id)
                        .with_message(workspace_dir.display().to_string()),
                )
                .await;
            return;
        }

        match self
            .provider
            .cleanup(workspace_dir, branch_name, &self.work_dir)
            .await
        {
            Ok(result) if result.left_in_place => {
                warn!(
                    path = %workspace_dir.display(),
                    "Workspace has uncommitted changes, left in place"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path = %workspace_dir.display(), error = %e, "Workspace cleanup failed");
            }
        }
    }
}
