//! Git-worktree-backed workspace provider.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::{CleanupOutcome, CreatedWorkspace, WorkspaceProvider};
use crate::config::{METADATA_DIR, ProjectPaths};
use crate::error::Result;
use crate::git::GitRunner;
use crate::tasks::task_slug;

pub struct WorktreeProvider {
    branch_prefix: String,
}

impl WorktreeProvider {
    pub fn new(branch_prefix: impl Into<String>) -> Self {
        Self {
            branch_prefix: branch_prefix.into(),
        }
    }
}

#[async_trait]
impl WorkspaceProvider for WorktreeProvider {
    fn base(&self, work_dir: &Path) -> PathBuf {
        ProjectPaths::new(work_dir.to_path_buf()).worktrees_dir
    }

    async fn create(
        &self,
        task_title: &str,
        agent_num: u64,
        base_branch: &str,
        base: &Path,
        work_dir: &Path,
    ) -> Result<CreatedWorkspace> {
        let slug = task_slug(task_title);
        let workspace_dir = base.join(format!("agent-{}-{}", agent_num, slug));
        let branch_name = format!("{}{}-{}", self.branch_prefix, agent_num, slug);

        fs::create_dir_all(base).await?;
        GitRunner::new(work_dir)
            .worktree_add(&workspace_dir, &branch_name, base_branch)
            .await?;

        info!(
            branch = %branch_name,
            path = %workspace_dir.display(),
            "Created worktree"
        );

        Ok(CreatedWorkspace {
            workspace_dir,
            branch_name,
        })
    }

    async fn cleanup(
        &self,
        workspace_dir: &Path,
        branch_name: &str,
        work_dir: &Path,
    ) -> Result<CleanupOutcome> {
        // The workspace metadata dir is ours, not the agent's output; it
        // must not count as uncommitted work.
        let _ = fs::remove_dir_all(workspace_dir.join(METADATA_DIR)).await;

        if GitRunner::new(workspace_dir)
            .has_uncommitted_changes()
            .await?
        {
            debug!(
                branch = %branch_name,
                path = %workspace_dir.display(),
                "Workspace has uncommitted changes, leaving in place"
            );
            return Ok(CleanupOutcome {
                left_in_place: true,
            });
        }

        GitRunner::new(work_dir).worktree_remove(workspace_dir).await?;
        debug!(path = %workspace_dir.display(), "Removed worktree");

        Ok(CleanupOutcome {
            left_in_place: false,
        })
    }
}
