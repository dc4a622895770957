//! GitHub releases catalog
//!
//! A shared tag-listing client plus the per-tool sources whose upstreams
//! publish through GitHub releases: OpenTofu, OpenBao and uv. Each tool
//! names its release assets differently; the URL construction lives with
//! the tool, the listing logic is shared.

use crate::{Error, ReleaseSource, Result};
use async_trait::async_trait;
use std::sync::Arc;
use wrk_fetch::Fetcher;
use wrk_platform::{Arch, Os, Platform};

/// Shared GitHub releases listing client for an `owner/repo`
pub struct GitHubReleases {
    fetcher: Arc<Fetcher>,
    owner: String,
    repo: String,
    per_page: usize,
}

impl GitHubReleases {
    /// Create a listing client
    pub fn new(fetcher: Arc<Fetcher>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            fetcher,
            owner: owner.into(),
            repo: repo.into(),
            per_page: 100,
        }
    }

    /// Set releases per page
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    fn api_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/releases?per_page={}",
            self.owner, self.repo, self.per_page
        )
    }

    /// Fetch release tags, newest first, `v` prefix stripped
    pub async fn versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        let url = self.api_url();
        tracing::debug!(url = %url, "Fetching GitHub releases");

        let releases = self.fetcher.get_json(&url).await?;
        let versions = parse_releases(&releases, include_prereleases)?;

        if versions.is_empty() {
            return Err(Error::NoVersions {
                tool: format!("{}/{}", self.owner, self.repo),
            });
        }
        tracing::debug!(count = versions.len(), repo = %self.repo, "Found versions");
        Ok(versions)
    }
}

/// Parse a GitHub releases array into version strings
pub(crate) fn parse_releases(
    value: &serde_json::Value,
    include_prereleases: bool,
) -> Result<Vec<String>> {
    let releases = value
        .as_array()
        .ok_or_else(|| Error::invalid_index("github", "expected array of releases"))?;

    let mut out: Vec<String> = releases
        .iter()
        .filter_map(|release| {
            let tag = release.get("tag_name")?.as_str()?;
            let prerelease = release
                .get("prerelease")
                .and_then(|p| p.as_bool())
                .unwrap_or(false);
            if prerelease && !include_prereleases {
                return None;
            }
            Some(tag.trim_start_matches('v').to_string())
        })
        .collect();

    wrk_resolver::sort_versions_desc(&mut out);
    Ok(out)
}

/// Release source for OpenTofu
pub struct TofuSource {
    releases: GitHubReleases,
    platform: Platform,
}

impl TofuSource {
    pub fn new(fetcher: Arc<Fetcher>, platform: Platform) -> Self {
        Self {
            releases: GitHubReleases::new(fetcher, "opentofu", "opentofu"),
            platform,
        }
    }
}

#[async_trait]
impl ReleaseSource for TofuSource {
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        self.releases.versions(include_prereleases).await
    }

    fn download_url(&self, version: &str) -> String {
        format!(
            "https://github.com/opentofu/opentofu/releases/download/v{}/tofu_{}_{}_{}.zip",
            version, version, self.platform.os, self.platform.arch
        )
    }

    fn checksum_url(&self, version: &str) -> Option<String> {
        Some(format!(
            "https://github.com/opentofu/opentofu/releases/download/v{}/tofu_{}_SHA256SUMS",
            version, version
        ))
    }

    fn name(&self) -> &str {
        "opentofu-github"
    }
}

/// Release source for OpenBao
pub struct BaoSource {
    releases: GitHubReleases,
    platform: Platform,
}

impl BaoSource {
    pub fn new(fetcher: Arc<Fetcher>, platform: Platform) -> Self {
        Self {
            releases: GitHubReleases::new(fetcher, "openbao", "openbao"),
            platform,
        }
    }

    fn os_capitalized(&self) -> &'static str {
        // OpenBao capitalizes OS names: Darwin, Linux, Windows
        match self.platform.os {
            Os::Linux => "Linux",
            Os::Darwin => "Darwin",
            Os::Windows => "Windows",
            Os::Other => "Other",
        }
    }
}

#[async_trait]
impl ReleaseSource for BaoSource {
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        self.releases.versions(include_prereleases).await
    }

    fn download_url(&self, version: &str) -> String {
        // bao_2.1.0_Linux_amd64.tar.gz - tar.gz on every platform
        format!(
            "https://github.com/openbao/openbao/releases/download/v{}/bao_{}_{}_{}.tar.gz",
            version,
            version,
            self.os_capitalized(),
            self.platform.arch
        )
    }

    fn checksum_url(&self, version: &str) -> Option<String> {
        Some(format!(
            "https://github.com/openbao/openbao/releases/download/v{}/bao_{}_SHA256SUMS",
            version, version
        ))
    }

    fn name(&self) -> &str {
        "openbao-github"
    }
}

/// Release source for uv
pub struct UvSource {
    releases: GitHubReleases,
    platform: Platform,
}

impl UvSource {
    pub fn new(fetcher: Arc<Fetcher>, platform: Platform) -> Self {
        Self {
            releases: GitHubReleases::new(fetcher, "astral-sh", "uv"),
            platform,
        }
    }

    /// uv names assets with target triples rather than os/arch pairs
    fn target_triple(&self) -> String {
        let arch = match self.platform.arch {
            Arch::Amd64 => "x86_64",
            Arch::Arm64 => "aarch64",
            Arch::Other => "unknown",
        };
        let os = match self.platform.os {
            Os::Linux => "unknown-linux-gnu",
            Os::Darwin => "apple-darwin",
            Os::Windows => "pc-windows-msvc",
            Os::Other => "unknown",
        };
        format!("{}-{}", arch, os)
    }
}

#[async_trait]
impl ReleaseSource for UvSource {
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        self.releases.versions(include_prereleases).await
    }

    fn download_url(&self, version: &str) -> String {
        let ext = if self.platform.os.is_windows() {
            ".zip"
        } else {
            ".tar.gz"
        };
        format!(
            "https://github.com/astral-sh/uv/releases/download/{}/uv-{}{}",
            version,
            self.target_triple(),
            ext
        )
    }

    fn checksum_url(&self, _version: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "uv-github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(os: Os, arch: Arch) -> Platform {
        Platform { os, arch }
    }

    #[test]
    fn parses_releases_and_strips_v() {
        let releases = serde_json::json!([
            {"tag_name": "v1.8.0", "prerelease": false},
            {"tag_name": "v1.9.0-beta1", "prerelease": true},
            {"tag_name": "v1.7.3", "prerelease": false},
        ]);

        let stable = parse_releases(&releases, false).unwrap();
        assert_eq!(stable, vec!["1.8.0", "1.7.3"]);

        let all = parse_releases(&releases, true).unwrap();
        assert_eq!(all, vec!["1.9.0-beta1", "1.8.0", "1.7.3"]);
    }

    #[test]
    fn tofu_urls() {
        let source = TofuSource::new(
            Arc::new(Fetcher::default()),
            platform(Os::Linux, Arch::Amd64),
        );
        assert_eq!(
            source.download_url("1.8.0"),
            "https://github.com/opentofu/opentofu/releases/download/v1.8.0/tofu_1.8.0_linux_amd64.zip"
        );
        assert!(source.checksum_url("1.8.0").unwrap().ends_with("tofu_1.8.0_SHA256SUMS"));
    }

    #[test]
    fn bao_capitalizes_os_and_always_tars() {
        let source = BaoSource::new(
            Arc::new(Fetcher::default()),
            platform(Os::Windows, Arch::Amd64),
        );
        assert_eq!(
            source.download_url("2.1.0"),
            "https://github.com/openbao/openbao/releases/download/v2.1.0/bao_2.1.0_Windows_amd64.tar.gz"
        );
    }

    #[test]
    fn uv_uses_target_triples() {
        let source = UvSource::new(
            Arc::new(Fetcher::default()),
            platform(Os::Darwin, Arch::Arm64),
        );
        assert_eq!(
            source.download_url("0.5.0"),
            "https://github.com/astral-sh/uv/releases/download/0.5.0/uv-aarch64-apple-darwin.tar.gz"
        );
        assert_eq!(source.checksum_url("0.5.0"), None);

        let win = UvSource::new(
            Arc::new(Fetcher::default()),
            platform(Os::Windows, Arch::Amd64),
        );
        assert!(win.download_url("0.5.0").ends_with("uv-x86_64-pc-windows-msvc.zip"));
    }
}
