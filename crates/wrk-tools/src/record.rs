//! Installed-version records

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wrk_platform::Platform;

/// Record written for every successful install
///
/// One record exists per `(tool, version, layout)`. The tf-family keeps its
/// records in the shared metadata ledger; the per-version layout writes an
/// `install.json` next to the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledVersionRecord {
    pub tool: String,
    pub version: String,
    /// RFC3339 install timestamp
    pub installed_at: String,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_url: Option<String>,
    /// Cached archive location, if it still exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(default)]
    pub archive_size: u64,
    pub binary_path: PathBuf,
    pub binary_size: u64,
    pub binary_sha256: String,
    pub platform: Platform,
    /// wrk version that performed the install
    pub manager_version: String,
}

impl InstalledVersionRecord {
    /// Filename of the per-version record
    pub const FILE_NAME: &'static str = "install.json";

    /// Load a record from a version directory
    pub fn load(version_dir: &Path) -> Option<Self> {
        let path = version_dir.join(Self::FILE_NAME);
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Persist the record into a version directory
    pub fn save(&self, version_dir: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(version_dir.join(Self::FILE_NAME), text)
    }
}
