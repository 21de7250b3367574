//! Runs exactly one task: isolated workspace, engine invocation with
//! retry, streamed step updates, recorded outcome. Workspace cleanup is the
//! scheduler's responsibility, not the runtime's.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use super::{PromptBuilder, PromptFlags, RetryPolicy, execute_with_retry};
use crate::config::ProjectPaths;
use crate::engine::{Engine, EngineOptions, EngineResult, SESSION_PREFIX};
use crate::error::Result;
use crate::output::detect_step;
use crate::process::{LineSink, tmux};
use crate::state::{AgentPatch, AgentStatus, StateRegistry};
use crate::tasks::{Task, task_slug};
use crate::workspace::WorkspaceProvider;

/// Requirements material copied into each workspace before the engine runs.
#[derive(Debug, Clone)]
pub struct RequirementSource {
    /// Path relative to the orchestrator's working directory.
    pub path: PathBuf,
    pub is_folder: bool,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub work_dir: PathBuf,
    pub workspace_base: PathBuf,
    pub base_branch: String,
    pub requirements: Option<RequirementSource>,
    pub prompt_flags: PromptFlags,
    pub retry: RetryPolicy,
    pub tmux: bool,
    pub model_override: Option<String>,
}

#[derive(Debug)]
pub struct AgentOutcome {
    pub task: Task,
    pub agent_id: String,
    pub workspace_dir: Option<PathBuf>,
    pub branch_name: Option<String>,
    pub result: Result<EngineResult>,
}

impl AgentOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.success)
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.result {
            Ok(r) if r.success => None,
            Ok(r) => Some(
                r.error
                    .clone()
                    .unwrap_or_else(|| "engine reported failure".to_string()),
            ),
            Err(e) => Some(e.to_string()),
        }
    }
}

pub struct AgentRuntime {
    engine: Arc<dyn Engine>,
    provider: Arc<dyn WorkspaceProvider>,
    registry: Arc<StateRegistry>,
    settings: AgentSettings,
}

impl AgentRuntime {
    pub fn new(
        engine: Arc<dyn Engine>,
        provider: Arc<dyn WorkspaceProvider>,
        registry: Arc<StateRegistry>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            engine,
            provider,
            registry,
            settings,
        }
    }

    pub async fn run(&self, task: Task, agent_num: u64) -> AgentOutcome {
        let agent_id = agent_num.to_string();

        self.registry.update_agent(
            &agent_id,
            AgentPatch {
                task_title: Some(task.title.clone()),
                status: Some(AgentStatus::Pending),
                step: Some("Creating worktree".to_string()),
                ..Default::default()
            },
        );

        let created = match self
            .provider
            .create(
                &task.title,
                agent_num,
                &self.settings.base_branch,
                &self.settings.workspace_base,
                &self.settings.work_dir,
            )
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.record_failure(&agent_id, &e.to_string());
                return AgentOutcome {
                    task,
                    agent_id,
                    workspace_dir: None,
                    branch_name: None,
                    result: Err(e),
                };
            }
        };

        self.registry.update_agent(
            &agent_id,
            AgentPatch {
                step: Some("Preparing worktree".to_string()),
                workspace_dir: Some(created.workspace_dir.display().to_string()),
                ..Default::default()
            },
        );

        if let Err(e) = self.prepare_workspace(&created.workspace_dir).await {
            self.record_failure(&agent_id, &e.to_string());
            return AgentOutcome {
                task,
                agent_id,
                workspace_dir: Some(created.workspace_dir),
                branch_name: Some(created.branch_name),
                result: Err(e),
            };
        }

        let requirements_path = self.settings.requirements.as_ref().map(|r| r.path.as_path());
        let prompt = PromptBuilder::new(requirements_path)
            .build_task_prompt(&task.title, &self.settings.prompt_flags);
        let slug = task_slug(&task.title);

        let options = EngineOptions {
            model_override: self.settings.model_override.clone(),
            tmux: self.settings.tmux,
            agent_id: Some(agent_id.clone()),
            task_slug: Some(slug.clone()),
        };

        if self.settings.tmux {
            let session = tmux::session_name(SESSION_PREFIX, &agent_id, &slug);
            self.registry.update_agent(
                &agent_id,
                AgentPatch {
                    status: Some(AgentStatus::Running),
                    step: Some("Executing (tmux)".to_string()),
                    tmux_session: Some(session.clone()),
                    ..Default::default()
                },
            );
            info!(
                agent = %agent_id,
                task = %task.title,
                "Agent running in tmux; attach with: tmux attach -t {}",
                session
            );
        } else {
            self.registry.update_agent(
                &agent_id,
                AgentPatch {
                    status: Some(AgentStatus::Running),
                    step: Some("Executing".to_string()),
                    ..Default::default()
                },
            );
        }

        let on_progress: LineSink = {
            let registry = Arc::clone(&self.registry);
            let agent_id = agent_id.clone();
            Arc::new(move |line: &str| {
                if let Some(step) = detect_step(line) {
                    registry.update_agent(&agent_id, AgentPatch::step(step));
                }
            })
        };

        let result = execute_with_retry(&self.settings.retry, || {
            self.engine.execute_streaming(
                &prompt,
                &created.workspace_dir,
                Arc::clone(&on_progress),
                &options,
            )
        })
        .await;

        match &result {
            Ok(r) if r.success => {
                self.registry.update_agent(
                    &agent_id,
                    AgentPatch {
                        status: Some(AgentStatus::Completed),
                        step: Some("Finished".to_string()),
                        ..Default::default()
                    },
                );
                debug!(
                    agent = %agent_id,
                    input_tokens = r.input_tokens,
                    output_tokens = r.output_tokens,
                    "Agent completed"
                );
            }
            Ok(r) => {
                let message = r.error.as_deref().unwrap_or("engine reported failure");
                self.record_failure(&agent_id, message);
            }
            Err(e) => {
                self.record_failure(&agent_id, &e.to_string());
            }
        }

        AgentOutcome {
            task,
            agent_id,
            workspace_dir: Some(created.workspace_dir),
            branch_name: Some(created.branch_name),
            result,
        }
    }

    fn record_failure(&self, agent_id: &str, message: &str) {
        warn!(agent = %agent_id, error = %message, "Agent failed");
        self.registry.update_agent(
            agent_id,
            AgentPatch {
                status: Some(AgentStatus::Failed),
                step: Some("Failed".to_string()),
                error: Some(message.to_string()),
                ..Default::default()
            },
        );
    }

    /// Copy the requirements source into the workspace and create the
    /// per-workspace metadata directory. A missing source is skipped.
    async fn prepare_workspace(&self, workspace: &Path) -> Result<()> {
        if let Some(req) = &self.settings.requirements {
            let src = self.settings.work_dir.join(&req.path);
            if src.exists() {
                let dst = workspace.join(&req.path);
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent).await?;
                }
                if req.is_folder {
                    copy_dir(&src, &dst).await?;
                } else {
                    fs::copy(&src, &dst).await?;
                }
            } else {
                debug!(path = %src.display(), "Requirements source missing, skipping copy");
            }
        }

        fs::create_dir_all(ProjectPaths::workspace_meta_dir(workspace)).await?;
        Ok(())
    }
}

async fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).await?;

    let mut entries = fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type().await?.is_dir() {
            Box::pin(copy_dir(&src_path, &dst_path)).await?;
        } else {
            fs::copy(&src_path, &dst_path).await?;
        }
    }

    Ok(())
}
