//! Merge pipeline behavior over real repositories: clean merges,
//! engine-resolved conflicts, and aborted merges.

mod fixtures;

use std::sync::Arc;

use tempfile::TempDir;

use claude_fleet::engine::Engine;
use claude_fleet::notification::Notifier;
use claude_fleet::scheduler::MergePipeline;

use fixtures::{MockEngine, branch_exists, current_branch, git, init_repo, success_result};

/// Repo layout used by the conflict tests:
/// - `main` has `conflict.txt` = "line-main"
/// - `clean` adds an unrelated file
/// - `conflicting` rewrites `conflict.txt`, as does `clean`'s sibling edit
///   merged before it, so merging `conflicting` second always conflicts.
fn setup_conflicting_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    init_repo(path);

    std::fs::write(path.join("conflict.txt"), "line-main\n").unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-m", "add conflict file"]);

    git(path, &["checkout", "-b", "clean"]);
    std::fs::write(path.join("clean.txt"), "clean work\n").unwrap();
    std::fs::write(path.join("conflict.txt"), "line-clean\n").unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-m", "clean branch work"]);

    git(path, &["checkout", "main"]);
    git(path, &["checkout", "-b", "conflicting"]);
    std::fs::write(path.join("conflict.txt"), "line-conflicting\n").unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-m", "conflicting branch work"]);

    git(path, &["checkout", "main"]);
    dir
}

#[tokio::test]
async fn clean_branches_merge_and_are_deleted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    init_repo(path);

    git(path, &["checkout", "-b", "feature"]);
    std::fs::write(path.join("feature.txt"), "work\n").unwrap();
    git(path, &["add", "-A"]);
    git(path, &["commit", "-m", "feature work"]);
    git(path, &["checkout", "main"]);

    let engine = MockEngine::failing("must not be called");
    let engine_ref: Arc<dyn Engine> = engine.clone();
    let notifier = Notifier::disabled();
    let pipeline = MergePipeline::new(engine_ref.as_ref(), path, &notifier);

    let report = pipeline
        .merge_all(&["feature".to_string()], "main")
        .await
        .unwrap();

    assert_eq!(report.merged, vec!["feature"]);
    assert!(report.failed.is_empty());
    assert_eq!(engine.call_count(), 0);
    assert!(path.join("feature.txt").exists());
    assert!(!branch_exists(path, "feature"));
}

#[tokio::test]
async fn conflict_resolved_by_engine_merges_both_branches() {
    let dir = setup_conflicting_repo();
    let path = dir.path().to_path_buf();

    // The resolver rewrites the conflicted file and stages it, leaving the
    // merge commit to the pipeline.
    let engine = MockEngine::new(move |prompt, work_dir| {
        assert!(prompt.contains("stopped on conflicts"));
        assert!(prompt.contains("- conflict.txt"));
        std::fs::write(work_dir.join("conflict.txt"), "line-resolved\n").unwrap();
        git(work_dir, &["add", "conflict.txt"]);
        success_result()
    });
    let engine_ref: Arc<dyn Engine> = engine.clone();
    let notifier = Notifier::disabled();
    let pipeline = MergePipeline::new(engine_ref.as_ref(), &path, &notifier);

    let report = pipeline
        .merge_all(&["clean".to_string(), "conflicting".to_string()], "main")
        .await
        .unwrap();

    assert_eq!(report.merged, vec!["clean", "conflicting"]);
    assert!(report.failed.is_empty());
    assert_eq!(engine.call_count(), 1);

    // The resolution was committed and both branches are gone.
    let content = std::fs::read_to_string(path.join("conflict.txt")).unwrap();
    assert_eq!(content, "line-resolved\n");
    assert_eq!(git(&path, &["status", "--porcelain"]), "");
    assert!(!branch_exists(&path, "clean"));
    assert!(!branch_exists(&path, "conflicting"));
}

#[tokio::test]
async fn failed_resolution_aborts_the_merge_and_keeps_the_branch() {
    let dir = setup_conflicting_repo();
    let path = dir.path().to_path_buf();

    let engine = MockEngine::failing("cannot resolve");
    let engine_ref: Arc<dyn Engine> = engine.clone();
    let notifier = Notifier::disabled();
    let pipeline = MergePipeline::new(engine_ref.as_ref(), &path, &notifier);

    let report = pipeline
        .merge_all(&["clean".to_string(), "conflicting".to_string()], "main")
        .await
        .unwrap();

    assert_eq!(report.merged, vec!["clean"]);
    assert_eq!(report.failed, vec!["conflicting"]);

    // The aborted merge left the tree at the pre-merge state, and the
    // unmerged branch survives for manual review.
    let content = std::fs::read_to_string(path.join("conflict.txt")).unwrap();
    assert_eq!(content, "line-clean\n");
    assert_eq!(git(&path, &["status", "--porcelain"]), "");
    assert!(branch_exists(&path, "conflicting"));
    assert!(!branch_exists(&path, "clean"));
}

#[tokio::test]
async fn unknown_branch_is_recorded_as_failed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    init_repo(path);

    let engine = MockEngine::failing("must not be called");
    let engine_ref: Arc<dyn Engine> = engine.clone();
    let notifier = Notifier::disabled();
    let pipeline = MergePipeline::new(engine_ref.as_ref(), path, &notifier);

    let report = pipeline
        .merge_all(&["no-such-branch".to_string()], "main")
        .await
        .unwrap();

    assert!(report.merged.is_empty());
    assert_eq!(report.failed, vec!["no-such-branch"]);
    assert_eq!(engine.call_count(), 0);
    assert_eq!(current_branch(path), "main");
}

#[tokio::test]
async fn resolver_that_leaves_conflicts_behind_fails_the_branch() {
    let dir = setup_conflicting_repo();
    let path = dir.path().to_path_buf();

    // Claims success but resolves nothing.
    let engine = MockEngine::new(|_, _| success_result());
    let engine_ref: Arc<dyn Engine> = engine.clone();
    let notifier = Notifier::disabled();
    let pipeline = MergePipeline::new(engine_ref.as_ref(), &path, &notifier);

    let report = pipeline
        .merge_all(&["clean".to_string(), "conflicting".to_string()], "main")
        .await
        .unwrap();

    assert_eq!(report.merged, vec!["clean"]);
    assert_eq!(report.failed, vec!["conflicting"]);
    assert_eq!(git(&path, &["status", "--porcelain"]), "");
}
