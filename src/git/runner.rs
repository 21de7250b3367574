use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{FleetError, Result};

/// Outcome of merging one agent branch into the target branch.
#[derive(Debug)]
pub struct MergeOutcome {
    pub success: bool,
    pub has_conflicts: bool,
    pub conflicted_files: Vec<String>,
    pub error: Option<String>,
}

pub struct GitRunner {
    working_dir: PathBuf,
}

impl GitRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, dir = %self.working_dir.display(), "Running git command");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(args = ?args, stderr = %stderr, "Git command failed");
        }

        Ok(output)
    }

    pub async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::Git(stderr.trim().to_string()));
        }

        Ok(output)
    }

    pub async fn current_branch(&self) -> Result<String> {
        let output = self
            .run_checked(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.run_checked(&["checkout", branch]).await?;
        Ok(())
    }

    /// Merge `branch` into the currently checked-out branch. A merge that
    /// stops on conflicts is not an error; the conflicted paths are listed
    /// in the outcome instead.
    pub async fn merge_branch(&self, branch: &str, message: &str) -> Result<MergeOutcome> {
        let output = self
            .run(&["merge", "--no-ff", branch, "-m", message])
            .await?;

        if output.status.success() {
            return Ok(MergeOutcome {
                success: true,
                has_conflicts: false,
                conflicted_files: Vec::new(),
                error: None,
            });
        }

        let conflicted_files = self.unmerged_files().await?;
        if !conflicted_files.is_empty() {
            return Ok(MergeOutcome {
                success: false,
                has_conflicts: true,
                conflicted_files,
                error: None,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(MergeOutcome {
            success: false,
            has_conflicts: false,
            conflicted_files: Vec::new(),
            error: Some(stderr.trim().to_string()),
        })
    }

    /// Paths with unresolved merge conflicts.
    pub async fn unmerged_files(&self) -> Result<Vec<String>> {
        let output = self
            .run(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Return the working tree to its pre-merge state. Best effort.
    pub async fn abort_merge(&self) {
        let result = self.run(&["merge", "--abort"]).await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to abort merge");
        }
    }

    /// Finish an in-progress merge using the prepared merge message.
    pub async fn commit_merge(&self) -> Result<bool> {
        let output = self.run(&["commit", "--no-edit"]).await?;
        Ok(output.status.success())
    }

    pub async fn merge_in_progress(&self) -> bool {
        self.run(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub async fn delete_branch(&self, branch: &str, force: bool) -> Result<bool> {
        let flag = if force { "-D" } else { "-d" };
        let output = self.run(&["branch", flag, branch]).await?;
        Ok(output.status.success())
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let output = self
            .run(&["rev-parse", "--verify", &format!("refs/heads/{}", branch)])
            .await?;
        Ok(output.status.success())
    }

    pub async fn has_uncommitted_changes(&self) -> Result<bool> {
        let output = self.run_checked(&["status", "--porcelain"]).await?;
        Ok(!output.stdout.is_empty())
    }

    pub async fn worktree_add(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| FleetError::Other("Invalid path encoding".into()))?;

        let output = if self.branch_exists(branch).await? {
            self.run(&["worktree", "add", path_str, branch]).await?
        } else {
            self.run(&["worktree", "add", "-b", branch, path_str, base])
                .await?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::Worktree {
                message: stderr.trim().to_string(),
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| FleetError::Other("Invalid path encoding".into()))?;

        let output = self
            .run(&["worktree", "remove", "--force", path_str])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::Worktree {
                message: stderr.trim().to_string(),
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    pub async fn worktree_prune(&self) {
        if let Err(e) = self.run(&["worktree", "prune"]).await {
            warn!(error = %e, "Failed to prune worktrees");
        }
    }
}
