//! Isolated per-agent workspaces.

mod worktree;

pub use worktree::WorktreeProvider;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CreatedWorkspace {
    pub workspace_dir: PathBuf,
    pub branch_name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CleanupOutcome {
    /// The workspace still holds uncommitted changes and was kept on disk.
    pub left_in_place: bool,
}

/// Produces and tears down isolated workspaces, one per agent.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Directory under which all workspaces of a run live.
    fn base(&self, work_dir: &Path) -> PathBuf;

    async fn create(
        &self,
        task_title: &str,
        agent_num: u64,
        base_branch: &str,
        base: &Path,
        work_dir: &Path,
    ) -> Result<CreatedWorkspace>;

    /// Remove a workspace after its agent finished. The branch is left for
    /// the merge phase to consume.
    async fn cleanup(
        &self,
        workspace_dir: &Path,
        branch_name: &str,
        work_dir: &Path,
    ) -> Result<CleanupOutcome>;
}
