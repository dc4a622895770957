//! Workspace repository discovery
//!
//! A repository is a direct child of the workspace root carrying both a
//! source-control marker (`.git`) and a project manifest (`wrk.toml` or
//! `pyproject.toml`). Discovery never recurses past the first manifest:
//! nested checkouts belong to their own workspace.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wrk_config::MANIFEST_FILE;

/// Information about a discovered repository
#[derive(Debug, Clone, PartialEq)]
pub struct RepoInfo {
    pub path: PathBuf,
    pub name: String,
    pub has_git: bool,
    pub has_manifest: bool,
}

/// Discovers repositories under a workspace root
#[derive(Debug, Clone)]
pub struct WorkspaceDiscovery {
    root: PathBuf,
}

impl WorkspaceDiscovery {
    /// Create a discovery rooted at a workspace directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find repositories matching the given directory-name patterns
    ///
    /// `patterns` are globs relative to the root (default `*`). Only
    /// directories that are git repositories with a manifest qualify.
    pub fn discover_repos(&self, patterns: Option<&[String]>) -> Vec<RepoInfo> {
        let default = ["*".to_string()];
        let patterns = patterns.unwrap_or(&default);

        let mut repos = Vec::new();
        for pattern in patterns {
            let full_pattern = self.root.join(pattern).display().to_string();
            let paths = match glob::glob(&full_pattern) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Invalid repo pattern");
                    continue;
                }
            };

            for path in paths.flatten() {
                if !path.is_dir() || path == self.root {
                    continue;
                }
                let info = self.analyze_repo(&path);
                if info.has_git && info.has_manifest && !repos.contains(&info) {
                    repos.push(info);
                }
            }
        }

        debug!(root = %self.root.display(), count = repos.len(), "Discovered repositories");
        repos
    }

    /// Analyze a single directory
    pub fn analyze_repo(&self, path: &Path) -> RepoInfo {
        let has_git = path.join(".git").exists();
        let wrk_manifest = path.join(MANIFEST_FILE);
        let pyproject = path.join("pyproject.toml");
        let has_manifest = wrk_manifest.exists() || pyproject.exists();

        let name = read_project_name(&wrk_manifest, "project_name")
            .or_else(|| read_nested_project_name(&pyproject))
            .unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        RepoInfo {
            path: path.to_path_buf(),
            name,
            has_git,
            has_manifest,
        }
    }
}

fn read_project_name(manifest: &Path, key: &str) -> Option<String> {
    let text = std::fs::read_to_string(manifest).ok()?;
    let table: toml::Table = text.parse().ok()?;
    table.get(key)?.as_str().map(|s| s.to_string())
}

fn read_nested_project_name(pyproject: &Path) -> Option<String> {
    let text = std::fs::read_to_string(pyproject).ok()?;
    let table: toml::Table = text.parse().ok()?;
    table
        .get("project")?
        .as_table()?
        .get("name")?
        .as_str()
        .map(|s| s.to_string())
}
