//! Workspace task orchestration
//!
//! Runs one named task across every discovered repository. Sequential mode
//! streams repo sections in order and can stop at the first failure;
//! parallel mode runs every repository to completion and aggregates, one
//! failure never cancelling its siblings. Repositories that do not define
//! the task are skipped and counted.

use crate::discovery::{RepoInfo, WorkspaceDiscovery};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use wrk_tasks::{TaskConfig, TaskRegistry, TaskResult};

/// Result of running a task across workspace repositories
#[derive(Debug)]
pub struct WorkspaceTaskResult {
    pub task_name: String,
    /// Per-repository results, keyed by repository name
    pub repo_results: BTreeMap<String, TaskResult>,
    pub total_repos: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Wall-clock duration in seconds
    pub duration: f64,
}

impl WorkspaceTaskResult {
    /// Whether every repository that ran succeeded
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Names of repositories whose task failed
    pub fn failed_repos(&self) -> Vec<&str> {
        self.repo_results
            .iter()
            .filter(|(_, r)| !r.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of repositories whose task succeeded
    pub fn succeeded_repos(&self) -> Vec<&str> {
        self.repo_results
            .iter()
            .filter(|(_, r)| r.success)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn empty(task_name: &str) -> Self {
        Self {
            task_name: task_name.to_string(),
            repo_results: BTreeMap::new(),
            total_repos: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            duration: 0.0,
        }
    }
}

/// Orchestrates task execution across workspace repositories
#[derive(Debug, Clone)]
pub struct WorkspaceOrchestrator {
    discovery: WorkspaceDiscovery,
}

impl WorkspaceOrchestrator {
    /// Create an orchestrator for a workspace root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            discovery: WorkspaceDiscovery::new(root),
        }
    }

    /// Discover repositories, optionally filtered by a name glob
    pub fn discover_repos(
        &self,
        patterns: Option<&[String]>,
        repo_filter: Option<&str>,
    ) -> Vec<RepoInfo> {
        let mut repos = self.discovery.discover_repos(patterns);

        if let Some(filter) = repo_filter {
            match glob::Pattern::new(filter) {
                Ok(pattern) => {
                    repos.retain(|repo| pattern.matches(&repo.name));
                    info!(filter = %filter, count = repos.len(), "Filtered repositories");
                }
                Err(e) => warn!(filter = %filter, error = %e, "Invalid repo filter"),
            }
        }

        repos
    }

    /// Run a task across the workspace
    pub async fn run_task(
        &self,
        task_name: &str,
        repo_patterns: Option<&[String]>,
        repo_filter: Option<&str>,
        parallel: bool,
        fail_fast: bool,
        env: Option<&BTreeMap<String, String>>,
    ) -> WorkspaceTaskResult {
        let repos = self.discover_repos(repo_patterns, repo_filter);

        if repos.is_empty() {
            warn!(task = task_name, "No repositories found");
            return WorkspaceTaskResult::empty(task_name);
        }

        if parallel {
            self.run_parallel(task_name, &repos, env).await
        } else {
            self.run_sequential(task_name, &repos, fail_fast, env).await
        }
    }

    /// Sequential execution with optional fail-fast
    async fn run_sequential(
        &self,
        task_name: &str,
        repos: &[RepoInfo],
        fail_fast: bool,
        env: Option<&BTreeMap<String, String>>,
    ) -> WorkspaceTaskResult {
        let start = Instant::now();
        let mut result = WorkspaceTaskResult::empty(task_name);
        result.total_repos = repos.len();

        info!(
            task = task_name,
            repos = repos.len(),
            fail_fast = fail_fast,
            "Running task sequentially across workspace"
        );

        for repo in repos {
            info!(repo = %repo.name, task = task_name, "Running task in repository");

            match run_in_repo(task_name, repo, env).await {
                Some(task_result) => {
                    let success = task_result.success;
                    result.repo_results.insert(repo.name.clone(), task_result);
                    if success {
                        result.succeeded += 1;
                    } else {
                        result.failed += 1;
                        error!(repo = %repo.name, task = task_name, "Task failed");
                        if fail_fast {
                            error!(repo = %repo.name, "Stopping due to fail-fast");
                            break;
                        }
                    }
                }
                None => {
                    warn!(repo = %repo.name, task = task_name, "Task not found, skipping");
                    result.skipped += 1;
                }
            }
        }

        result.duration = start.elapsed().as_secs_f64();
        result
    }

    /// Parallel execution; failures never cancel sibling repositories
    async fn run_parallel(
        &self,
        task_name: &str,
        repos: &[RepoInfo],
        env: Option<&BTreeMap<String, String>>,
    ) -> WorkspaceTaskResult {
        let start = Instant::now();

        info!(
            task = task_name,
            repos = repos.len(),
            "Running task in parallel across workspace"
        );

        let futures = repos.iter().map(|repo| async move {
            (repo.name.clone(), run_in_repo(task_name, repo, env).await)
        });
        let outcomes = futures_util::future::join_all(futures).await;

        let mut result = WorkspaceTaskResult::empty(task_name);
        result.total_repos = repos.len();
        for (name, outcome) in outcomes {
            match outcome {
                Some(task_result) => {
                    if task_result.success {
                        result.succeeded += 1;
                    } else {
                        result.failed += 1;
                    }
                    result.repo_results.insert(name, task_result);
                }
                None => result.skipped += 1,
            }
        }

        result.duration = start.elapsed().as_secs_f64();
        result
    }
}

/// Run the task in one repository; `None` means the task does not exist
/// there
async fn run_in_repo(
    task_name: &str,
    repo: &RepoInfo,
    env: Option<&BTreeMap<String, String>>,
) -> Option<TaskResult> {
    let registry = match TaskRegistry::from_repo(&repo.path) {
        Ok(registry) => registry,
        Err(e) => {
            error!(repo = %repo.name, error = %e, "Failed to load task registry");
            return Some(error_result(task_name, e.to_string()));
        }
    };

    if registry.resolve(task_name, &[]).is_err() {
        return None;
    }

    match registry.run_task(task_name, &[], false, env).await {
        Ok(result) => Some(result),
        Err(e) => {
            error!(repo = %repo.name, task = task_name, error = %e, "Exception running task");
            Some(error_result(task_name, e.to_string()))
        }
    }
}

fn error_result(task_name: &str, message: String) -> TaskResult {
    TaskResult {
        task: TaskConfig::command(task_name, format!("# Error: {}", message)),
        success: false,
        exit_code: -1,
        stdout: String::new(),
        stderr: message,
        duration: 0.0,
    }
}
