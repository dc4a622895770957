//! wrk release sources
//!
//! One [`ReleaseSource`] implementation per upstream catalog convention:
//! the HashiCorp releases index, the official go.dev release index, and
//! GitHub releases. A source enumerates available versions (newest first)
//! and constructs the download and checksum URLs for the current platform.
//!
//! All network access goes through [`wrk_fetch::Fetcher`], which carries
//! the retry and circuit-breaker discipline.

mod github;
mod godev;
mod hashicorp;

pub use github::{GitHubReleases, BaoSource, TofuSource, UvSource};
pub use godev::GoSource;
pub use hashicorp::HashicorpSource;

use async_trait::async_trait;

/// Result type alias for wrk-sources operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for catalog access
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network-level failure, already retried by the fetcher
    #[error(transparent)]
    Fetch(#[from] wrk_fetch::Error),

    /// Catalog responded with an unexpected shape
    #[error("Invalid {catalog} index: {reason}")]
    InvalidIndex { catalog: String, reason: String },

    /// Catalog listed no usable versions
    #[error("No versions available for {tool}")]
    NoVersions { tool: String },
}

impl Error {
    fn invalid_index(catalog: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIndex {
            catalog: catalog.into(),
            reason: reason.into(),
        }
    }
}

/// An upstream release catalog for a single tool
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Enumerate available versions, newest first
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>>;

    /// Download URL for a version on the current platform
    fn download_url(&self, version: &str) -> String;

    /// Checksum listing URL, when the catalog publishes one
    fn checksum_url(&self, version: &str) -> Option<String>;

    /// Catalog name for logging
    fn name(&self) -> &str;
}

/// Prerelease suffix tokens in HashiCorp-style version strings
pub(crate) fn has_prerelease_token(version: &str) -> bool {
    let lower = version.to_lowercase();
    ["alpha", "beta", "rc", "pre"].iter().any(|t| lower.contains(t))
}
