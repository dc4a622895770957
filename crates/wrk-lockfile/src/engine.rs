//! Lockfile engine
//!
//! Owns `<project>/wrk.lock`: create, save (atomic), load, validity check
//! against the configuration fingerprint, resolve-and-lock through the
//! release catalogs, and reinstall-from-lock. Batch operations report
//! per-tool outcomes and keep going; a tool that fails to resolve or
//! install never aborts the rest.

use crate::fingerprint::config_checksum;
use crate::lockfile::{Lockfile, LOCKFILE_NAME};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wrk_config::WrkConfig;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;
use wrk_tools::{TfManager, ToolDescriptor, ToolManager};

/// Result type alias for wrk-lockfile operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for lockfile handling
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lockfile JSON could not be produced
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Version catalog abstraction used during resolution
///
/// Production code answers from the tool's release source; tests answer
/// from canned lists.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Available versions for a tool, newest first
    async fn available_versions(
        &self,
        tool: &str,
        include_prereleases: bool,
    ) -> std::result::Result<Vec<String>, String>;
}

/// Catalog provider backed by the built-in tool descriptors
pub struct DescriptorCatalog {
    fetcher: Arc<Fetcher>,
    platform: Platform,
}

impl DescriptorCatalog {
    pub fn new() -> wrk_fetch::Result<Self> {
        Ok(Self {
            fetcher: Arc::new(Fetcher::new()?),
            platform: Platform::current(),
        })
    }
}

#[async_trait]
impl CatalogProvider for DescriptorCatalog {
    async fn available_versions(
        &self,
        tool: &str,
        include_prereleases: bool,
    ) -> std::result::Result<Vec<String>, String> {
        let descriptor = ToolDescriptor::builtin(tool).map_err(|e| e.to_string())?;
        let source = descriptor.release_source(Arc::clone(&self.fetcher), self.platform);
        source
            .list_versions(include_prereleases)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Outcome of a sync run
#[derive(Debug, Default, PartialEq)]
pub struct SyncReport {
    pub installed: usize,
    pub failed: usize,
    /// Matrix entries are CI fan-out material, not project state; sync
    /// skips them
    pub skipped_matrix: usize,
}

/// The lockfile engine for one project directory
pub struct LockfileEngine {
    project_dir: PathBuf,
    lockfile_path: PathBuf,
}

impl LockfileEngine {
    /// Create an engine rooted at a project directory
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let lockfile_path = project_dir.join(LOCKFILE_NAME);
        Self {
            project_dir,
            lockfile_path,
        }
    }

    /// The lockfile path this engine owns
    pub fn lockfile_path(&self) -> &Path {
        &self.lockfile_path
    }

    /// Create a lockfile fingerprinting the configuration
    pub fn generate(&self, config: &WrkConfig) -> Lockfile {
        Lockfile::from_config(config)
    }

    /// Persist a lockfile atomically as pretty-printed JSON
    pub fn save(&self, lockfile: &Lockfile) -> Result<()> {
        let text = serde_json::to_string_pretty(lockfile)?;
        let tmp = self
            .lockfile_path
            .with_extension(format!("tmp-{}", std::process::id()));
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.lockfile_path)?;
        debug!(path = %self.lockfile_path.display(), "Saved lockfile");
        Ok(())
    }

    /// Load the lockfile; missing or unparseable files yield `None`
    pub fn load(&self) -> Option<Lockfile> {
        let text = std::fs::read_to_string(&self.lockfile_path).ok()?;
        match serde_json::from_str(&text) {
            Ok(lockfile) => Some(lockfile),
            Err(e) => {
                warn!(path = %self.lockfile_path.display(), error = %e, "Corrupted lockfile");
                None
            }
        }
    }

    /// Remove the lockfile
    pub fn clean(&self) -> Result<()> {
        if self.lockfile_path.exists() {
            std::fs::remove_file(&self.lockfile_path)?;
        }
        Ok(())
    }

    /// Whether the stored lockfile still matches the configuration
    pub fn is_valid(&self, config: &WrkConfig) -> bool {
        match self.load() {
            Some(lockfile) => lockfile.config_checksum == config_checksum(config),
            None => false,
        }
    }

    /// Locked versions for scalar entries: tool id -> version
    pub fn locked_versions(&self) -> BTreeMap<String, String> {
        let Some(lockfile) = self.load() else {
            return BTreeMap::new();
        };
        lockfile
            .resolved_tools
            .iter()
            .filter(|(key, _)| !Lockfile::is_matrix_key(key))
            .map(|(key, tool)| (key.clone(), tool.version.clone()))
            .collect()
    }

    /// Resolve every tool constraint and write a fresh lockfile
    ///
    /// Tools whose catalog fails or whose constraints match nothing are
    /// logged and skipped; the remaining tools still lock.
    pub async fn resolve_and_lock(
        &self,
        config: &WrkConfig,
        catalog: &dyn CatalogProvider,
    ) -> Result<Lockfile> {
        let mut lockfile = self.generate(config);

        for (tool, spec) in &config.tools {
            let candidates = match catalog
                .available_versions(tool, config.include_prereleases)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(tool = %tool, error = %e, "Failed to fetch versions, skipping tool");
                    continue;
                }
            };

            // Resolve each sub-constraint separately so every matrix entry
            // remembers which expression produced it
            let mut resolved: Vec<(String, String)> = Vec::new();
            for constraint in spec.constraints() {
                match wrk_resolver::resolve_one(&constraint, &candidates, config.include_prereleases)
                {
                    Ok(Some(version)) => {
                        if !resolved.iter().any(|(v, _)| v == &version) {
                            resolved.push((version, constraint.clone()));
                        }
                    }
                    Ok(None) => {
                        warn!(tool = %tool, constraint = %constraint, "Constraint matched no version");
                    }
                    Err(e) => {
                        warn!(tool = %tool, constraint = %constraint, error = %e, "Invalid constraint, skipping");
                    }
                }
            }

            if resolved.is_empty() {
                warn!(tool = %tool, "No versions resolved, tool not locked");
                continue;
            }

            if spec.is_matrix() {
                for (version, resolved_from) in resolved {
                    lockfile.add_matrix_entry(tool.clone(), version, resolved_from);
                }
            } else {
                let (version, resolved_from) = resolved.into_iter().next().expect("non-empty");
                lockfile.add_resolved_tool(tool.clone(), version, resolved_from);
            }
        }

        self.save(&lockfile)?;
        info!(
            tools = lockfile.resolved_tools.len(),
            checksum = %lockfile.config_checksum,
            "Locked resolution"
        );
        Ok(lockfile)
    }

    /// Install every scalar entry of a lockfile
    ///
    /// Matrix entries (`tool@version` keys) are skipped. Per-tool failures
    /// are logged and counted; the run never fails fast.
    pub async fn sync_from_lock(
        &self,
        lockfile: &Lockfile,
        config: &WrkConfig,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for (key, entry) in &lockfile.resolved_tools {
            if Lockfile::is_matrix_key(key) {
                report.skipped_matrix += 1;
                continue;
            }

            match self.install_one(&entry.name, &entry.version, config).await {
                Ok(()) => {
                    info!(tool = %entry.name, version = %entry.version, "Synced from lockfile");
                    report.installed += 1;
                }
                Err(e) => {
                    warn!(tool = %entry.name, version = %entry.version, error = %e, "Sync failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            installed = report.installed,
            failed = report.failed,
            skipped = report.skipped_matrix,
            "Lockfile sync complete"
        );
        Ok(report)
    }

    async fn install_one(
        &self,
        tool: &str,
        version: &str,
        config: &WrkConfig,
    ) -> std::result::Result<(), wrk_tools::Error> {
        let descriptor = ToolDescriptor::builtin(tool)?;
        if descriptor.is_tf_family() {
            let bin_dir = self.project_dir.join("workenv").join("bin");
            let mut manager = TfManager::new(tool, config, Some(bin_dir))?;
            manager.install(version, false).await
        } else {
            let manager = ToolManager::new(tool, config)?;
            manager.install(version, false).await
        }
    }
}
