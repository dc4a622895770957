//! Error types for wrk-fetch

use std::path::PathBuf;

/// Result type alias for wrk-fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while fetching artifacts
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Download failed
    #[error("Download failed from {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Network timeout
    #[error("Network timeout while downloading from {url}")]
    NetworkTimeout { url: String },

    /// URL is malformed or uses a disallowed scheme
    #[error("Invalid download URL: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Circuit breaker is open for the host
    #[error("Circuit breaker open for {host}: too many recent failures, retry after {retry_after_secs}s")]
    CircuitOpen { host: String, retry_after_secs: u64 },

    /// Checksum verification failed
    #[error("Checksum verification failed for {file_path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Every mirror in a fallback list failed
    #[error("All {count} mirrors failed, last error: {last_error}")]
    AllMirrorsFailed { count: usize, last_error: String },

    /// JSON response could not be parsed
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a download failed error
    pub fn download_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable by retrying
    ///
    /// Checksum mismatches and open circuit breakers are never retried;
    /// repeating either would only repeat the failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NetworkTimeout { .. } | Error::Http(_) | Error::DownloadFailed { .. }
        )
    }

    /// Check if this error is related to network issues
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::DownloadFailed { .. } | Error::NetworkTimeout { .. }
        )
    }
}
