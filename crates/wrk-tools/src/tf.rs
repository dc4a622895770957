//! tf-family tool manager
//!
//! Terraform-shaped tools (the IBM terraform variant and OpenTofu) install
//! into a flat `<versions_root>/<prefix>_<version>` layout so the external
//! tfswitch convention keeps working against the same directory. On top of
//! that layout this manager maintains the shared metadata ledger and the
//! RECENT file, activates versions per profile, copies active binaries into
//! the project's `bin/`, and optionally publishes a version globally under
//! the canonical system name.

use crate::descriptor::{global_binary_name, ToolDescriptor};
use crate::error::{Error, Result};
use crate::install::{
    atomic_copy, build_record, fetch_archive, find_binary, is_version_like, make_executable,
    verify_binary, InstallOptions,
};
use crate::ledger::{Ledger, RecentFile};
use crate::record::InstalledVersionRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wrk_config::WrkConfig;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;
use wrk_sources::ReleaseSource;

/// Default tf versions root, shared with tfswitch
pub fn default_versions_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".terraform.versions")
}

/// Default global activation directory
pub fn default_global_bin_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("bin")
}

/// Manager for tf-family tools using the flat layout
pub struct TfManager {
    descriptor: &'static ToolDescriptor,
    prefix: &'static str,
    source: Box<dyn ReleaseSource>,
    fetcher: Arc<Fetcher>,
    platform: Platform,
    versions_root: PathBuf,
    cache_dir: PathBuf,
    options: InstallOptions,
    ledger: Ledger,
    recent: RecentFile,
    /// Project-local bin directory active binaries are copied into
    project_bin_dir: Option<PathBuf>,
    global_bin_dir: PathBuf,
}

impl TfManager {
    /// Create a manager for a tf-family tool from project configuration
    pub fn new(tool: &str, config: &WrkConfig, project_bin_dir: Option<PathBuf>) -> Result<Self> {
        let descriptor = ToolDescriptor::builtin(tool)?;
        let fetcher = Arc::new(Fetcher::new().map_err(Error::Fetch)?);
        let platform = Platform::current();
        let source = descriptor.release_source(Arc::clone(&fetcher), platform);

        Self::with_parts(
            descriptor,
            source,
            fetcher,
            platform,
            default_versions_root(),
            config.cache_root(),
            InstallOptions::from(config),
            project_bin_dir,
        )
    }

    /// Create a manager with explicit collaborators and roots
    #[allow(clippy::too_many_arguments)]
    pub fn with_parts(
        descriptor: &'static ToolDescriptor,
        source: Box<dyn ReleaseSource>,
        fetcher: Arc<Fetcher>,
        platform: Platform,
        versions_root: PathBuf,
        cache_dir: PathBuf,
        options: InstallOptions,
        project_bin_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let prefix = descriptor.tf_prefix().ok_or_else(|| Error::UnknownTool {
            tool: format!("{} is not a tf-family tool", descriptor.id),
        })?;

        std::fs::create_dir_all(&versions_root)?;
        let ledger = Ledger::load(&versions_root);
        let recent = RecentFile::load(&versions_root);

        Ok(Self {
            descriptor,
            prefix,
            source,
            fetcher,
            platform,
            versions_root,
            cache_dir,
            options,
            ledger,
            recent,
            project_bin_dir,
            global_bin_dir: default_global_bin_dir(),
        })
    }

    /// Override the global activation directory
    pub fn with_global_bin_dir(mut self, dir: PathBuf) -> Self {
        self.global_bin_dir = dir;
        self
    }

    /// The managed tool's id
    pub fn tool(&self) -> &str {
        self.descriptor.id
    }

    /// Path of the flat binary for a version
    pub fn binary_path(&self, version: &str) -> PathBuf {
        self.versions_root.join(format!("{}_{}", self.prefix, version))
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
        let marker = format!("{}_", self.prefix);
        let mut versions = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&self.versions_root) {
            for entry in entries.flatten() {
                if !entry.path().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(version) = name.strip_prefix(&marker) {
                    if is_version_like(version) {
                        versions.push(version.to_string());
                    }
                }
            }
        }
        wrk_resolver::sort_versions_desc(&mut versions);
        versions
    }

    /// The profile activations apply to
    ///
    /// `WRK_PROFILE` wins, then the ledger's sticky `_current_profile`,
    /// then `default`.
    pub fn current_profile(&self) -> String {
        wrk_config::active_profile()
            .or_else(|| self.ledger.current_profile().map(|s| s.to_string()))
            .unwrap_or_else(|| "default".to_string())
    }

    /// Active version for the current profile, from the ledger only
    pub fn active_version(&self) -> Option<String> {
        self.ledger
            .active_version(&self.current_profile(), self.descriptor.id)
    }

    /// Activate a version for the current profile
    ///
    /// Writes the ledger, promotes the version in RECENT, and copies the
    /// active binaries of every tf-family tool into the project `bin/`.
    pub fn activate(&mut self, version: &str) -> Result<()> {
        let binary = self.binary_path(version);
        if !binary.exists() {
            return Err(Error::NotInstalled {
                tool: self.descriptor.id.to_string(),
                version: version.to_string(),
            });
        }

        let profile = self.current_profile();
        self.ledger
            .set_active_version(&profile, self.descriptor.id, version);
        self.ledger.save()?;
        self.recent.promote(self.descriptor.id, version);

        self.copy_active_binaries_to_project_bin();

        info!(
            tool = self.descriptor.id,
            version = version,
            profile = %profile,
            "Activated version"
        );
        Ok(())
    }

    /// Copy every tf-family tool's active binary into the project bin
    ///
    /// Copies rather than symlinks so the result works on every platform.
    /// Each copy is independent; a missing sibling tool is skipped.
    fn copy_active_binaries_to_project_bin(&self) {
        let Some(bin_dir) = &self.project_bin_dir else {
            warn!("No project bin directory available, skipping binary copy");
            return;
        };
        if let Err(e) = std::fs::create_dir_all(bin_dir) {
            warn!(dir = %bin_dir.display(), error = %e, "Cannot create project bin directory");
            return;
        }

        let profile = self.current_profile();
        for descriptor in ToolDescriptor::all().iter().filter(|d| d.is_tf_family()) {
            let Some(prefix) = descriptor.tf_prefix() else {
                continue;
            };
            let Some(version) = self.ledger.active_version(&profile, descriptor.id) else {
                continue;
            };
            let source_path = self.versions_root.join(format!("{}_{}", prefix, version));
            if !source_path.exists() {
                continue;
            }

            let target = bin_dir.join(self.platform.executable_name(descriptor.executable));
            match atomic_copy(&source_path, &target).and_then(|_| make_executable(&target)) {
                Ok(()) => {
                    debug!(tool = descriptor.id, version = %version, target = %target.display(), "Copied active binary")
                }
                Err(e) => warn!(tool = descriptor.id, error = %e, "Failed to copy active binary"),
            }
        }
    }

    /// Publish a version globally under the canonical system name
    pub fn set_global_version(&mut self, version: &str) -> Result<()> {
        let binary = self.binary_path(version);
        if !binary.exists() {
            return Err(Error::NotInstalled {
                tool: self.descriptor.id.to_string(),
                version: version.to_string(),
            });
        }

        std::fs::create_dir_all(&self.global_bin_dir)?;
        let target = self
            .global_bin_dir
            .join(self.platform.executable_name(global_binary_name(self.descriptor.id)));
        atomic_copy(&binary, &target)?;
        make_executable(&target)?;

        self.ledger.set_global_version(self.descriptor.id, version);
        self.ledger.save()?;

        info!(
            tool = self.descriptor.id,
            version = version,
            target = %target.display(),
            "Set global version"
        );
        Ok(())
    }

    /// The globally activated version, if any
    pub fn global_version(&self) -> Option<String> {
        self.ledger.global_version(self.descriptor.id)
    }

    /// Install a version into the flat layout
    pub async fn install(&mut self, version: &str, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(
                tool = self.descriptor.id,
                version = version,
                "Dry run: would install"
            );
            return Ok(());
        }

        if self.binary_path(version).exists() {
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
            let binary = self.binary_path(version);
            if binary.exists() {
                warn!(
                    tool = self.descriptor.id,
                    version = version,
                    "Cleaning up failed installation"
                );
                let _ = std::fs::remove_file(&binary);
            }
            // The ledger may already carry the record; verification runs
            // after the metadata write
            self.ledger.remove_record(self.prefix, version);
            let _ = self.ledger.save();
            self.recent
                .set_installed(self.descriptor.id, &self.installed_versions());
        }
        result?;

        self.activate(version)
    }

    async fn install_inner(&mut self, version: &str) -> Result<()> {
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
            .prefix(&format!("{}_{}_extract", self.prefix, version))
            .tempdir_in(&self.cache_dir)?;
        wrk_archive::extract(&archive_path, scratch.path())?;

        // The archive ships the upstream binary name (terraform/tofu); the
        // flat file carries the prefix_version name instead.
        let found = find_binary(scratch.path(), self.descriptor.archive_binary).ok_or(
            Error::BinaryNotFound {
                tool: self.descriptor.id.to_string(),
                binary: self.descriptor.archive_binary.to_string(),
            },
        )?;

        let target = self.binary_path(version);
        atomic_copy(&found, &target)?;
        make_executable(&target)?;
        info!(tool = self.descriptor.id, binary = %target.display(), "Installed binary");

        let record = build_record(
            self.descriptor,
            version,
            self.source.download_url(version),
            self.source.checksum_url(version),
            &archive_path,
            &target,
            self.platform,
        )?;
        self.ledger.insert_record(self.prefix, record);
        self.ledger.save()?;
        self.recent
            .set_installed(self.descriptor.id, &self.installed_versions());

        verify_binary(self.descriptor, &target, version, &[]).await?;
        Ok(())
    }

    /// Remove an installed version
    pub fn remove(&mut self, version: &str) -> Result<()> {
        let was_active = self.active_version().as_deref() == Some(version);

        let binary = self.binary_path(version);
        if binary.exists() {
            std::fs::remove_file(&binary)?;
            info!(tool = self.descriptor.id, version = version, "Removed version");

            self.ledger.remove_record(self.prefix, version);
            self.ledger.save()?;
            self.recent
                .set_installed(self.descriptor.id, &self.installed_versions());
        }

        if was_active {
            let profile = self.current_profile();
            self.ledger.clear_active_version(&profile, self.descriptor.id);
            self.ledger.save()?;
            debug!(tool = self.descriptor.id, "Cleared active version");
        }
        Ok(())
    }

    /// Re-run installation verification for a version
    pub async fn verify(&self, version: &str) -> bool {
        let binary = self.binary_path(version);
        match verify_binary(self.descriptor, &binary, version, &[]).await {
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

    /// Switch to a version: install when missing, then activate
    pub async fn switch(&mut self, version: &str, dry_run: bool) -> Result<()> {
        if dry_run {
            info!(
                tool = self.descriptor.id,
                version = version,
                installed = self.binary_path(version).exists(),
                "Dry run: would switch"
            );
            return Ok(());
        }

        if !self.binary_path(version).exists() {
            self.install(version, false).await?;
        } else {
            self.activate(version)?;
        }

        info!(tool = self.descriptor.id, version = version, "Switched version");
        Ok(())
    }

    /// Install record from the ledger for a version
    pub fn record(&self, version: &str) -> Option<&InstalledVersionRecord> {
        self.ledger.record(self.prefix, version)
    }

    /// The tf versions root this manager owns
    pub fn versions_root(&self) -> &Path {
        &self.versions_root
    }
}
