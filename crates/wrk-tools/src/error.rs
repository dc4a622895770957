//! Error types for wrk-tools

use std::path::PathBuf;

/// Result type alias for wrk-tools operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during tool management
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Download layer failure
    #[error(transparent)]
    Fetch(#[from] wrk_fetch::Error),

    /// Extraction layer failure
    #[error(transparent)]
    Archive(#[from] wrk_archive::Error),

    /// Release catalog failure
    #[error(transparent)]
    Source(#[from] wrk_sources::Error),

    /// Unknown tool id
    #[error("Unknown tool: {tool}")]
    UnknownTool { tool: String },

    /// Current platform cannot run this tool
    #[error("Unsupported platform {platform} for {tool}")]
    UnsupportedPlatform { tool: String, platform: String },

    /// Expected binary missing from the extracted archive
    #[error("{tool} binary not found in archive (looking for {binary})")]
    BinaryNotFound { tool: String, binary: String },

    /// Binary exists but does not report the expected version
    #[error("Verification failed for {tool} {version}: {reason}")]
    VerificationFailed {
        tool: String,
        version: String,
        reason: String,
    },

    /// Version is not installed
    #[error("{tool} {version} is not installed")]
    NotInstalled { tool: String, version: String },

    /// Metadata ledger could not be read or written
    #[error("Metadata ledger error at {path}: {reason}")]
    Ledger { path: PathBuf, reason: String },

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a verification failure
    pub fn verification_failed(
        tool: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::VerificationFailed {
            tool: tool.into(),
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Create a ledger error
    pub fn ledger(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Ledger {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
