//! Workspace orchestration against real repositories on disk

#![cfg(unix)]

use std::path::Path;
use wrk_workspace::WorkspaceOrchestrator;

/// Create a repo with a `[tasks]` table in its manifest
fn make_repo(root: &Path, dir: &str, tasks: &str) {
    let repo = root.join(dir);
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::write(
        repo.join("wrk.toml"),
        format!("project_name = \"{}\"\ntask_auto_detect = false\n\n[tasks]\n{}", dir, tasks),
    )
    .unwrap();
}

#[tokio::test]
async fn sequential_run_aggregates_per_repo() {
    let root = tempfile::tempdir().unwrap();
    make_repo(root.path(), "alpha", "test = \"true\"");
    make_repo(root.path(), "beta", "test = \"false\"");
    make_repo(root.path(), "gamma", "other = \"true\"");

    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test", None, None, false, false, None)
        .await;

    assert_eq!(result.total_repos, 3);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    // gamma has no `test` task
    assert_eq!(result.skipped, 1);
    assert!(!result.success());
    assert_eq!(result.failed_repos(), vec!["beta"]);
    assert_eq!(result.succeeded_repos(), vec!["alpha"]);
}

#[tokio::test]
async fn fail_fast_stops_sequential_run() {
    let root = tempfile::tempdir().unwrap();
    // BTreeMap ordering makes execution order deterministic: a-fails first
    make_repo(root.path(), "a-fails", "test = \"false\"");
    make_repo(root.path(), "b-never-runs", "test = \"touch b-ran\"");

    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test", None, None, false, true, None)
        .await;

    assert_eq!(result.failed, 1);
    assert!(!root.path().join("b-never-runs/b-ran").exists());
}

#[tokio::test]
async fn parallel_run_never_cancels_siblings() {
    let root = tempfile::tempdir().unwrap();
    make_repo(root.path(), "fails", "test = \"false\"");
    make_repo(root.path(), "slow", "test = \"sh -c 'sleep 0.2; touch slow-ran'\"");

    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test", None, None, true, false, None)
        .await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 1);
    assert!(root.path().join("slow/slow-ran").exists());
}

#[tokio::test]
async fn repo_filter_scopes_the_run() {
    let root = tempfile::tempdir().unwrap();
    make_repo(root.path(), "lib-one", "test = \"true\"");
    make_repo(root.path(), "lib-two", "test = \"true\"");
    make_repo(root.path(), "app", "test = \"false\"");

    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test", None, Some("lib-*"), false, false, None)
        .await;

    assert_eq!(result.total_repos, 2);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 0);
    assert!(result.success());
}

#[tokio::test]
async fn empty_workspace_yields_empty_result() {
    let root = tempfile::tempdir().unwrap();
    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test", None, None, false, false, None)
        .await;

    assert_eq!(result.total_repos, 0);
    assert!(result.success());
    assert!(result.repo_results.is_empty());
}

#[tokio::test]
async fn namespaced_default_resolves_across_repos() {
    let root = tempfile::tempdir().unwrap();
    let repo = root.path().join("nested");
    std::fs::create_dir_all(repo.join(".git")).unwrap();
    std::fs::write(
        repo.join("wrk.toml"),
        "project_name = \"nested\"\ntask_auto_detect = false\n\n[tasks.test.unit]\n_default = \"true\"\n",
    )
    .unwrap();

    let orchestrator = WorkspaceOrchestrator::new(root.path());
    let result = orchestrator
        .run_task("test.unit", None, None, false, false, None)
        .await;

    assert_eq!(result.succeeded, 1);
}
