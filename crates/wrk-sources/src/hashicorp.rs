//! HashiCorp-style release index
//!
//! `https://releases.hashicorp.com/<product>/index.json` serves
//! `{"versions": {"<v>": {...}}}`; archives and `SHA256SUMS` listings hang
//! off per-version directories. Used for the terraform tf-variant and for
//! Vault.

use crate::{has_prerelease_token, Error, ReleaseSource, Result};
use async_trait::async_trait;
use std::sync::Arc;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;

/// Default HashiCorp releases endpoint
pub const DEFAULT_BASE_URL: &str = "https://releases.hashicorp.com";

/// Release source for a product on a HashiCorp-style index
pub struct HashicorpSource {
    fetcher: Arc<Fetcher>,
    platform: Platform,
    product: String,
    base_url: String,
}

impl HashicorpSource {
    /// Create a source for a product (e.g. `terraform`, `vault`)
    pub fn new(fetcher: Arc<Fetcher>, platform: Platform, product: impl Into<String>) -> Self {
        Self {
            fetcher,
            platform,
            product: product.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the releases endpoint (mirror support)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn index_url(&self) -> String {
        format!("{}/{}/index.json", self.base_url, self.product)
    }

    /// Archive filename for a version on this platform
    pub fn archive_name(&self, version: &str) -> String {
        format!(
            "{}_{}_{}_{}.zip",
            self.product, version, self.platform.os, self.platform.arch
        )
    }
}

/// Parse the `{"versions": {...}}` index shape
pub(crate) fn parse_index(
    value: &serde_json::Value,
    include_prereleases: bool,
) -> Result<Vec<String>> {
    let versions = value
        .get("versions")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::invalid_index("hashicorp", "missing 'versions' object"))?;

    let mut out: Vec<String> = versions
        .values()
        .filter_map(|info| info.get("version").and_then(|v| v.as_str()))
        .filter(|v| include_prereleases || !has_prerelease_token(v))
        .map(|v| v.to_string())
        .collect();

    wrk_resolver::sort_versions_desc(&mut out);
    Ok(out)
}

#[async_trait]
impl ReleaseSource for HashicorpSource {
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        let url = self.index_url();
        tracing::debug!(url = %url, product = %self.product, "Fetching release index");

        let index = self.fetcher.get_json(&url).await?;
        let versions = parse_index(&index, include_prereleases)?;

        if versions.is_empty() {
            return Err(Error::NoVersions {
                tool: self.product.clone(),
            });
        }
        tracing::debug!(count = versions.len(), product = %self.product, "Found versions");
        Ok(versions)
    }

    fn download_url(&self, version: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.product,
            version,
            self.archive_name(version)
        )
    }

    fn checksum_url(&self, version: &str) -> Option<String> {
        Some(format!(
            "{}/{}/{}/{}_{}_SHA256SUMS",
            self.base_url, self.product, version, self.product, version
        ))
    }

    fn name(&self) -> &str {
        "hashicorp-releases"
    }
}
