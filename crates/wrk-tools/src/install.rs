//! Shared install machinery
//!
//! The pieces every layout uses: cache-aware archive fetching with the
//! checksum gate, binary location inside extracted trees, executable-bit
//! handling, atomic copies, and verify-by-running.

use crate::descriptor::ToolDescriptor;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use wrk_config::WrkConfig;
use wrk_fetch::{filename_from_url, find_in_checksum_listing, validate_url, FetchOptions, Fetcher};
use wrk_platform::Platform;
use wrk_sources::ReleaseSource;

/// How long a `<binary> --version` probe may run
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Install behaviour switches, derived from configuration
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub use_cache: bool,
    pub verify_checksums: bool,
    pub clean_on_failure: bool,
    pub create_symlinks: bool,
    pub include_prereleases: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            verify_checksums: true,
            clean_on_failure: true,
            create_symlinks: true,
            include_prereleases: false,
        }
    }
}

impl From<&WrkConfig> for InstallOptions {
    fn from(config: &WrkConfig) -> Self {
        Self {
            use_cache: config.workenv.use_cache,
            verify_checksums: config.verify_checksums,
            clean_on_failure: config.clean_on_failure,
            create_symlinks: config.create_symlinks,
            include_prereleases: config.include_prereleases,
        }
    }
}

/// Fetch a release archive into the cache, verifying its checksum
///
/// Reuses an existing cache entry when `use_cache` allows it. When the
/// catalog publishes a checksum listing and verification is enabled, a
/// mismatch deletes the archive and surfaces as
/// [`wrk_fetch::Error::ChecksumMismatch`].
pub(crate) async fn fetch_archive(
    descriptor: &ToolDescriptor,
    source: &dyn ReleaseSource,
    fetcher: &Fetcher,
    cache_dir: &Path,
    version: &str,
    options: &InstallOptions,
) -> Result<PathBuf> {
    let url = source.download_url(version);
    validate_url(&url).map_err(Error::Fetch)?;

    let archive_name = filename_from_url(&url);
    let archive_path = cache_dir.join(&archive_name);
    std::fs::create_dir_all(cache_dir)?;

    if archive_path.exists() && options.use_cache {
        debug!(tool = descriptor.id, archive = %archive_path.display(), "Using cached download");
    } else {
        debug!(tool = descriptor.id, url = %url, "Downloading release archive");
        fetcher
            .fetch(&url, &archive_path, &FetchOptions::default())
            .await?;
    }

    if options.verify_checksums {
        if let Some(checksum_url) = source.checksum_url(version) {
            verify_archive_checksum(
                fetcher,
                &checksum_url,
                cache_dir,
                &archive_path,
                &archive_name,
                options,
            )
            .await?;
        }
    }

    Ok(archive_path)
}

/// Fetch the checksum listing into the cache and verify the archive
///
/// The listing file is cached alongside the archive. A listing that cannot
/// be fetched, or that has no entry for the archive, downgrades to a
/// warning; a present-but-mismatching entry deletes the archive and fails.
async fn verify_archive_checksum(
    fetcher: &Fetcher,
    checksum_url: &str,
    cache_dir: &Path,
    archive_path: &Path,
    archive_name: &str,
    options: &InstallOptions,
) -> Result<()> {
    let listing_name = filename_from_url(checksum_url);
    let listing_path = cache_dir.join(&listing_name);

    if !(listing_path.exists() && options.use_cache) {
        if let Err(e) = fetcher
            .fetch(checksum_url, &listing_path, &FetchOptions::default())
            .await
        {
            warn!(url = %checksum_url, error = %e, "Failed to fetch checksum listing, skipping verification");
            return Ok(());
        }
    }

    let listing = std::fs::read_to_string(&listing_path)?;
    match find_in_checksum_listing(&listing, archive_name) {
        Some(expected) => {
            if let Err(e) = wrk_fetch::verify_file(archive_path, &expected) {
                let _ = std::fs::remove_file(archive_path);
                return Err(Error::Fetch(e));
            }
            Ok(())
        }
        None => {
            warn!(file = archive_name, "No checksum entry for archive, skipping verification");
            Ok(())
        }
    }
}

/// Locate a binary by name anywhere under an extracted tree
pub(crate) fn find_binary(root: &Path, base_name: &str) -> Option<PathBuf> {
    let candidates = [base_name.to_string(), format!("{}.exe", base_name)];
    for entry in walkdir::WalkDir::new(root).into_iter().flatten() {
        if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy();
            if candidates.iter().any(|c| c == &name) {
                return Some(entry.into_path());
            }
        }
    }
    None
}

/// Set the executable bits on unix; no-op elsewhere
pub(crate) fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Copy a file into place via a temporary sibling and atomic rename
///
/// Concurrent installers racing on the same target converge: whichever
/// rename lands last wins, and both wrote identical bytes.
pub(crate) fn atomic_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = dst.with_extension(format!("tmp-{}", std::process::id()));
    std::fs::copy(src, &tmp)?;
    std::fs::rename(&tmp, dst)?;
    Ok(())
}

/// Create (or replace) a symlink; falls back to copying on Windows
pub(crate) fn link_or_copy(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if link.exists() || link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)?;
    }
    #[cfg(windows)]
    {
        std::fs::copy(target, link)?;
    }
    debug!(link = %link.display(), target = %target.display(), "Activated binary");
    Ok(())
}

/// Run a binary's version command and check the output
///
/// The probe gets [`VERIFY_TIMEOUT`] to complete; stdout must match the
/// descriptor's version pattern templated with the requested version.
pub(crate) async fn verify_binary(
    descriptor: &ToolDescriptor,
    binary: &Path,
    version: &str,
    extra_env: &[(String, String)],
) -> Result<()> {
    if !binary.exists() {
        return Err(Error::verification_failed(
            descriptor.id,
            version,
            format!("binary not found at {}", binary.display()),
        ));
    }

    let mut command = tokio::process::Command::new(binary);
    command.args(descriptor.verify_args);
    for (key, value) in extra_env {
        command.env(key, value);
    }
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());

    let output = tokio::time::timeout(VERIFY_TIMEOUT, command.output())
        .await
        .map_err(|_| {
            Error::verification_failed(descriptor.id, version, "version command timed out")
        })??;

    if !output.status.success() {
        return Err(Error::verification_failed(
            descriptor.id,
            version,
            format!(
                "version command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pattern = descriptor.version_regex(version);
    let re = regex::Regex::new(&pattern)
        .map_err(|e| Error::verification_failed(descriptor.id, version, e.to_string()))?;

    if re.is_match(&stdout) {
        debug!(tool = descriptor.id, version = version, "Verification successful");
        Ok(())
    } else {
        Err(Error::verification_failed(
            descriptor.id,
            version,
            format!("version output did not match: {}", stdout.trim()),
        ))
    }
}

/// Build an installed-version record for a freshly placed binary
pub(crate) fn build_record(
    descriptor: &ToolDescriptor,
    version: &str,
    download_url: String,
    checksum_url: Option<String>,
    archive_path: &Path,
    binary_path: &Path,
    platform: Platform,
) -> Result<crate::record::InstalledVersionRecord> {
    let binary_size = std::fs::metadata(binary_path).map(|m| m.len()).unwrap_or(0);
    let archive_size = std::fs::metadata(archive_path).map(|m| m.len()).unwrap_or(0);
    let binary_sha256 = wrk_fetch::sha256_file(binary_path)?;

    Ok(crate::record::InstalledVersionRecord {
        tool: descriptor.id.to_string(),
        version: version.to_string(),
        installed_at: chrono::Utc::now().to_rfc3339(),
        download_url,
        checksum_url,
        archive_path: Some(archive_path.to_path_buf()),
        archive_size,
        binary_path: binary_path.to_path_buf(),
        binary_size,
        binary_sha256,
        platform,
        manager_version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// A directory name that looks like a version
pub(crate) fn is_version_like(name: &str) -> bool {
    let mut parts = name.split('.');
    matches!(
        (parts.next(), parts.next()),
        (Some(major), Some(minor))
            if major.chars().all(|c| c.is_ascii_digit())
                && !major.is_empty()
                && minor.chars().all(|c| c.is_ascii_digit())
                && !minor.is_empty()
    )
}
