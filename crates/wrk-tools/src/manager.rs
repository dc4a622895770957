//! Per-version-directory tool manager
//!
//! Owns the `<install_root>/<tool>/<version>/bin/<executable>` layout and
//! drives the full install pipeline: cache-aware download, checksum gate,
//! safe extraction, binary placement, verify-by-running, record write and
//! activation. Installs are idempotent and atomic from the caller's
//! perspective: either a fully verified binary exists afterwards or (with
//! `clean_on_failure`) nothing does.

use crate::descriptor::{InstallQuirk, ToolDescriptor};
use crate::error::{Error, Result};
use crate::install::{
    atomic_copy, build_record, fetch_archive, find_binary, is_version_like, link_or_copy,
    make_executable, verify_binary, InstallOptions,
};
use crate::record::InstalledVersionRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wrk_config::WrkConfig;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;
use wrk_sources::ReleaseSource;

/// File under the tool directory naming the active version
const ACTIVE_FILE: &str = "ACTIVE";

/// Manager for tools using the per-version-directory layout
pub struct ToolManager {
    descriptor: &'static ToolDescriptor,
    source: Box<dyn ReleaseSource>,
    fetcher: Arc<Fetcher>,
    platform: Platform,
    install_root: PathBuf,
    cache_dir: PathBuf,
    options: InstallOptions,
    /// Version pinned by the manifest, which wins over the on-disk index
    config_version: Option<String>,
}

impl ToolManager {
    /// Create a manager for a tool from project configuration
    pub fn new(tool: &str, config: &WrkConfig) -> Result<Self> {
        let descriptor = ToolDescriptor::builtin(tool)?;
        let platform = Platform::current();
        if !platform.is_supported() {
            return Err(Error::UnsupportedPlatform {
                tool: tool.to_string(),
                platform: platform.platform_string(),
            });
        }

        let fetcher = Arc::new(Fetcher::new().map_err(Error::Fetch)?);
        let source = descriptor.release_source(Arc::clone(&fetcher), platform);

        Ok(Self {
            descriptor,
            source,
            fetcher,
            platform,
            install_root: config.install_root(),
            cache_dir: config.cache_root(),
            options: InstallOptions::from(config),
            config_version: config.tool_version(tool),
        })
    }

    /// Create a manager with explicit collaborators
    ///
    /// Used by tests and by callers that already hold a source (the
    /// lockfile engine resolves through the same source it installs with).
    pub fn with_parts(
        descriptor: &'static ToolDescriptor,
        source: Box<dyn ReleaseSource>,
        fetcher: Arc<Fetcher>,
        platform: Platform,
        install_root: PathBuf,
        cache_dir: PathBuf,
        options: InstallOptions,
    ) -> Self {
        Self {
            descriptor,
            source,
            fetcher,
            platform,
            install_root,
            cache_dir,
            options,
            config_version: None,
        }
    }

    /// Pin the manifest-configured version
    pub fn with_config_version(mut self, version: Option<String>) -> Self {
        self.config_version = version;
        self
    }

    /// The managed tool's id
    pub fn tool(&self) -> &str {
        self.descriptor.id
    }

    fn tool_dir(&self) -> PathBuf {
        self.install_root.join(self.descriptor.id)
    }

    /// Directory a version installs into
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.tool_dir().join(version)
    }

    /// Path of the installed binary for a version
    pub fn binary_path(&self, version: &str) -> PathBuf {
        self.version_dir(version)
            .join("bin")
            .join(self.platform.executable_name(self.descriptor.executable))
    }

    /// Versions available upstream, newest first
    pub async fn available_versions(&self) -> Result<Vec<String>> {
        Ok(self
            .source
            .list_versions(self.options.include_prereleases)
            .await?)
    }

    /// Versions present on disk, newest first
    pub fn installed_versions(&self) -> Vec<String> {
        let mut versions = Vec::new();
        if let Ok(entries) = std::fs::read_dir(self.tool_dir()) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.path().is_dir() && is_version_like(&name) {
                    versions.push(name);
                }
            }
        }
        wrk_resolver::sort_versions_desc(&mut versions);
        versions
    }

    /// The active version: manifest pin first, then the on-disk index
    pub fn active_version(&self) -> Option<String> {
        if let Some(version) = &self.config_version {
            return Some(version.clone());
        }
        std::fs::read_to_string(self.tool_dir().join(ACTIVE_FILE))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Mark a version active and refresh the shim link
    pub fn activate(&self, version: &str) -> Result<()> {
        let binary = self.binary_path(version);
        if !binary.exists() {
            return Err(Error::NotInstalled {
                tool: self.descriptor.id.to_string(),
                version: version.to_string(),
            });
        }

        let tool_dir = self.tool_dir();
        std::fs::create_dir_all(&tool_dir)?;
        std::fs::write(tool_dir.join(ACTIVE_FILE), version)?;

        if self.options.create_symlinks {
            let shim = self
                .install_root
                .join("bin")
                .join(self.platform.executable_name(self.descriptor.executable));
            link_or_copy(&binary, &shim)?;
        }

        info!(tool = self.descriptor.id, version = version, "Activated version");
        Ok(())
    }

    /// Install a version
    ///
    /// Idempotent: when the target binary already exists the version is
    /// re-registered as active and nothing is downloaded.
    pub async fn install(&self, version: &str, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(
                tool = self.descriptor.id,
                version = version,
                "Dry run: would install"
            );
            return Ok(());
        }

        let binary = self.binary_path(version);
        if binary.exists() {
            info!(
                tool = self.descriptor.id,
                version = version,
                "Already installed, re-activating"
            );
            return self.activate(version);
        }

        info!(tool = self.descriptor.id, version = version, "Installing");

        let result = self.install_inner(version).await;
        if result.is_err() && self.options.clean_on_failure {
            let version_dir = self.version_dir(version);
            if version_dir.exists() {
                warn!(
                    tool = self.descriptor.id,
                    version = version,
                    "Cleaning up failed installation"
                );
                let _ = std::fs::remove_dir_all(&version_dir);
            }
        }
        result?;

        self.activate(version)
    }

    async fn install_inner(&self, version: &str) -> Result<()> {
        let archive_path = fetch_archive(
            self.descriptor,
            self.source.as_ref(),
            &self.fetcher,
            &self.cache_dir,
            version,
            &self.options,
        )
        .await?;

        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}_{}_extract", self.descriptor.id, version))
            .tempdir_in(&self.cache_dir)?;
        wrk_archive::extract(&archive_path, scratch.path())?;

        let version_dir = self.version_dir(version);
        std::fs::create_dir_all(&version_dir)?;

        match self.descriptor.quirk {
            InstallQuirk::GoTree => self.place_go_tree(scratch.path(), &version_dir)?,
            InstallQuirk::None | InstallQuirk::SearchRecursive => {
                self.place_single_binary(scratch.path(), version)?
            }
        }

        let binary = self.binary_path(version);
        verify_binary(self.descriptor, &binary, version, &self.verify_env(version)).await?;

        let record = build_record(
            self.descriptor,
            version,
            self.source.download_url(version),
            self.source.checksum_url(version),
            &archive_path,
            &binary,
            self.platform,
        )?;
        record.save(&version_dir)?;

        info!(
            tool = self.descriptor.id,
            version = version,
            binary = %binary.display(),
            "Installed"
        );
        Ok(())
    }

    /// The Go archive ships a whole `go/` tree that must move as a unit;
    /// a `bin/go` symlink keeps the generic binary-path shape
    fn place_go_tree(&self, scratch: &Path, version_dir: &Path) -> Result<()> {
        let go_root = scratch.join("go");
        if !go_root.exists() {
            return Err(Error::BinaryNotFound {
                tool: self.descriptor.id.to_string(),
                binary: "go/".to_string(),
            });
        }

        let target_root = version_dir.join("go");
        move_dir(&go_root, &target_root)?;

        let go_binary = target_root
            .join("bin")
            .join(self.platform.executable_name("go"));
        if !go_binary.exists() {
            return Err(Error::BinaryNotFound {
                tool: self.descriptor.id.to_string(),
                binary: "go/bin/go".to_string(),
            });
        }

        link_or_copy(&go_binary, &self.binary_path_from(version_dir))?;
        Ok(())
    }

    fn place_single_binary(&self, scratch: &Path, version: &str) -> Result<()> {
        let found =
            find_binary(scratch, self.descriptor.archive_binary).ok_or(Error::BinaryNotFound {
                tool: self.descriptor.id.to_string(),
                binary: self.descriptor.archive_binary.to_string(),
            })?;

        let target = self.binary_path(version);
        atomic_copy(&found, &target)?;
        make_executable(&target)?;
        debug!(binary = %target.display(), "Placed binary");
        Ok(())
    }

    fn binary_path_from(&self, version_dir: &Path) -> PathBuf {
        version_dir
            .join("bin")
            .join(self.platform.executable_name(self.descriptor.executable))
    }

    fn verify_env(&self, version: &str) -> Vec<(String, String)> {
        match self.descriptor.quirk {
            InstallQuirk::GoTree => vec![(
                "GOROOT".to_string(),
                self.version_dir(version).join("go").display().to_string(),
            )],
            _ => Vec::new(),
        }
    }

    /// Remove an installed version
    ///
    /// Clears the active marker when the removed version was active.
    pub fn remove(&self, version: &str) -> Result<()> {
        let version_dir = self.version_dir(version);
        if version_dir.exists() {
            std::fs::remove_dir_all(&version_dir)?;
            info!(tool = self.descriptor.id, version = version, "Removed version");
        }

        if self.active_version().as_deref() == Some(version) {
            let _ = std::fs::remove_file(self.tool_dir().join(ACTIVE_FILE));
            debug!(tool = self.descriptor.id, "Cleared active version");
        }
        Ok(())
    }

    /// Re-run installation verification for a version
    pub async fn verify(&self, version: &str) -> bool {
        let binary = self.binary_path(version);
        match verify_binary(self.descriptor, &binary, version, &self.verify_env(version)).await {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    tool = self.descriptor.id,
                    version = version,
                    error = %e,
                    "Verification failed"
                );
                false
            }
        }
    }

    /// The installed-version record for a version, if present
    pub fn record(&self, version: &str) -> Option<InstalledVersionRecord> {
        InstalledVersionRecord::load(&self.version_dir(version))
    }
}

/// Move a directory, falling back to copy when rename crosses filesystems
fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(src, dst)?;
    std::fs::remove_dir_all(src)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            #[cfg(unix)]
            {
                let perms = std::fs::metadata(entry.path())?.permissions();
                std::fs::set_permissions(&target, perms)?;
            }
        }
    }
    Ok(())
}
