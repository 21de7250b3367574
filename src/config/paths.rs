use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;

/// Metadata directory name, used both at the project root and inside each
/// agent workspace.
pub const METADATA_DIR: &str = ".fleet";

#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub fleet_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
    pub progress_file: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: PathBuf) -> Self {
        let fleet_dir = root.join(METADATA_DIR);

        Self {
            worktrees_dir: fleet_dir.join("worktrees"),
            logs_dir: fleet_dir.join("logs"),
            state_file: fleet_dir.join("state.json"),
            progress_file: fleet_dir.join("progress.log"),
            root,
            fleet_dir,
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        let dirs = [&self.fleet_dir, &self.worktrees_dir, &self.logs_dir];

        for dir in dirs {
            fs::create_dir_all(dir).await?;
        }

        Ok(())
    }

    /// Metadata directory inside an agent workspace.
    pub fn workspace_meta_dir(workspace: &Path) -> PathBuf {
        workspace.join(METADATA_DIR)
    }

    /// Scratch directory for multiplexer output and exit files.
    pub fn workspace_tmp_dir(workspace: &Path) -> PathBuf {
        Self::workspace_meta_dir(workspace).join("tmp")
    }
}
