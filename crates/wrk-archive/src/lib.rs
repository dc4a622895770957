//! wrk archive extraction
//!
//! Safe extraction of the archive formats tool releases ship in:
//!
//! - `.tar.gz` / `.tgz` - Gzip compressed tar archives
//! - `.tar` - Plain tar archives
//! - `.zip` - ZIP archives
//!
//! Extraction is two-pass: every entry path is validated against the
//! destination root before anything is written, so an archive carrying a
//! `..`-bearing or absolute entry aborts with [`Error::UnsafePath`] and
//! leaves the destination untouched. Entry types other than regular files
//! and directories are skipped with a warning.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Result type alias for wrk-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during extraction
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive entry would escape the extraction root
    #[error("Archive entry escapes extraction root: {entry}")]
    UnsafePath { entry: String },

    /// Archive format is not supported
    #[error("Unsupported archive format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// Archive is malformed
    #[error("Failed to extract {archive}: {reason}")]
    Extraction { archive: PathBuf, reason: String },

    /// ZIP-specific error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl Error {
    fn extraction(archive: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.into(),
            reason: reason.into(),
        }
    }
}

/// Archive format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip compressed tar (.tar.gz, .tgz)
    TarGz,
    /// Plain tar (.tar)
    Tar,
    /// ZIP archive (.zip)
    Zip,
}

impl ArchiveFormat {
    /// Detect archive format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path_str.ends_with(".tar") {
            Some(Self::Tar)
        } else if path_str.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Resolve an entry path against the destination, rejecting escapes
///
/// Lexical normalization only: `.` components are dropped, and any `..`,
/// root or prefix component fails the whole entry. Symlinks inside the
/// archive are never followed (they are skipped entirely), so lexical
/// containment is sufficient.
fn safe_join(dest: &Path, entry: &Path) -> Result<PathBuf> {
    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath {
                    entry: entry.display().to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Extract an archive to a destination directory
///
/// The format is inferred from the file extension. The destination is
/// created if missing. On [`Error::UnsafePath`] nothing has been written.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let format = ArchiveFormat::from_path(archive).ok_or(Error::UnsupportedFormat {
        path: archive.to_path_buf(),
    })?;

    std::fs::create_dir_all(dest)?;

    debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        format = ?format,
        "Extracting archive"
    );

    match format {
        ArchiveFormat::TarGz | ArchiveFormat::Tar => extract_tar(archive, dest, format),
        ArchiveFormat::Zip => extract_zip(archive, dest),
    }
}

fn open_tar(archive: &Path, format: ArchiveFormat) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = std::fs::File::open(archive)?;
    let reader: Box<dyn Read> = match format {
        ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
        ArchiveFormat::Tar => Box::new(file),
        ArchiveFormat::Zip => unreachable!("zip handled separately"),
    };
    Ok(tar::Archive::new(reader))
}

fn extract_tar(archive: &Path, dest: &Path, format: ArchiveFormat) -> Result<()> {
    // Validation pass: the stream cannot be rewound, so the archive is
    // opened twice - once to vet every entry path, once to write.
    let mut validation = open_tar(archive, format)?;
    for entry in validation
        .entries()
        .map_err(|e| Error::extraction(archive, e.to_string()))?
    {
        let entry = entry.map_err(|e| Error::extraction(archive, e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| Error::extraction(archive, e.to_string()))?;
        safe_join(dest, &path)?;
    }

    let mut reader = open_tar(archive, format)?;
    for entry in reader
        .entries()
        .map_err(|e| Error::extraction(archive, e.to_string()))?
    {
        let mut entry = entry.map_err(|e| Error::extraction(archive, e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::extraction(archive, e.to_string()))?
            .into_owned();
        let target = safe_join(dest, &entry_path)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut out)?;

                #[cfg(unix)]
                if let Ok(mode) = entry.header().mode() {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o777))?;
                }
            }
            other => {
                warn!(
                    entry = %entry_path.display(),
                    kind = ?other,
                    "Skipping unsupported archive entry type"
                );
            }
        }
    }

    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;

    // Validation pass over all entry names before writing anything
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i)?;
        safe_join(dest, Path::new(entry.name()))?;
    }

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let target = safe_join(dest, Path::new(entry.name()))?;

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if !entry.is_file() {
            warn!(entry = entry.name(), "Skipping unsupported archive entry type");
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    Ok(())
}
