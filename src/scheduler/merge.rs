//! Post-batch merge pipeline.
//!
//! Merges completed agent branches into the target branch one at a time,
//! never concurrently. Conflicts are handed to the engine for resolution;
//! branches that cannot be merged are kept for manual review.

use std::path::Path;

use tracing::{info, warn};

use crate::engine::{Engine, EngineOptions};
use crate::error::Result;
use crate::git::GitRunner;
use crate::notification::{EventType, FleetEvent, Notifier};

#[derive(Debug, Default)]
pub struct MergeReport {
    pub merged: Vec<String>,
    pub failed: Vec<String>,
}

pub struct MergePipeline<'a> {
    engine: &'a dyn Engine,
    work_dir: &'a Path,
    notifier: &'a Notifier,
}

impl<'a> MergePipeline<'a> {
    pub fn new(engine: &'a dyn Engine, work_dir: &'a Path, notifier: &'a Notifier) -> Self {
        Self {
            engine,
            work_dir,
            notifier,
        }
    }

    pub async fn merge_all(&self, branches: &[String], target: &str) -> Result<MergeReport> {
        let git = GitRunner::new(self.work_dir);
        git.checkout(target).await?;

        let mut report = MergeReport::default();

        for branch in branches {
            let message = format!("Merge agent branch {}", branch);
            match git.merge_branch(branch, &message).await {
                Ok(outcome) if outcome.success => {
                    info!(branch = %branch, target = %target, "Merged");
                    report.merged.push(branch.clone());
                }
                Ok(outcome) if outcome.has_conflicts => {
                    warn!(
                        branch = %branch,
                        files = ?outcome.conflicted_files,
                        "Merge conflicts, delegating resolution to the engine"
                    );
                    if self
                        .resolve_conflicts(&git, branch, target, &outcome.conflicted_files)
                        .await
                    {
                        info!(branch = %branch, "Conflicts resolved and merge committed");
                        report.merged.push(branch.clone());
                    } else {
                        git.abort_merge().await;
                        warn!(branch = %branch, "Conflict resolution failed, merge aborted");
                        report.failed.push(branch.clone());
                    }
                }
                Ok(outcome) => {
                    warn!(
                        branch = %branch,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "Merge failed"
                    );
                    report.failed.push(branch.clone());
                }
                Err(e) => {
                    warn!(branch = %branch, error = %e, "Merge failed");
                    report.failed.push(branch.clone());
                }
            }
        }

        for branch in &report.merged {
            match git.delete_branch(branch, true).await {
                Ok(true) => {}
                _ => warn!(branch = %branch, "Failed to delete merged branch"),
            }
        }

        info!(
            merged = report.merged.len(),
            failed = report.failed.len(),
            "Merge phase finished"
        );

        if report.failed.is_empty() {
            self.notifier
                .notify(
                    &FleetEvent::new(EventType::MergeCompleted)
                        .with_message(format!("{} branches merged", report.merged.len())),
                )
                .await;
        } else {
            warn!(branches = ?report.failed, "Unmerged branches kept for manual review");
            self.notifier
                .notify(&FleetEvent::new(EventType::MergeFailed).with_message(format!(
                    "{} merged, {} failed: {}",
                    report.merged.len(),
                    report.failed.len(),
                    report.failed.join(", ")
                )))
                .await;
        }

        Ok(report)
    }

    /// Ask the engine to resolve the conflicted files, then verify and
    /// commit the merge. Returns false if anything is left unresolved.
    async fn resolve_conflicts(
        &self,
        git: &GitRunner,
        branch: &str,
        target: &str,
        files: &[String],
    ) -> bool {
        let prompt = conflict_prompt(branch, target, files);
        let resolved = match self
            .engine
            .execute(&prompt, self.work_dir, &EngineOptions::default())
            .await
        {
            Ok(result) if result.success => true,
            Ok(result) => {
                warn!(
                    branch = %branch,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Engine could not resolve conflicts"
                );
                false
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "Conflict resolution invocation failed");
                false
            }
        };
        if !resolved {
            return false;
        }

        match git.unmerged_files().await {
            Ok(unmerged) if unmerged.is_empty() => {}
            _ => return false,
        }

        // The engine may have concluded the merge itself; only commit if
        // one is still in progress.
        if git.merge_in_progress().await {
            git.commit_merge().await.unwrap_or(false)
        } else {
            true
        }
    }
}

fn conflict_prompt(branch: &str, target: &str, files: &[String]) -> String {
    let file_list = files
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"A merge of branch `{branch}` into `{target}` stopped on conflicts.

Conflicted files:
{file_list}

Resolve every conflict so both changes are preserved where they are
compatible, keeping the code consistent and compiling. Remove all conflict
markers, then stage the resolved files with `git add`. Do not commit; the
merge commit is created for you."#
    )
}
