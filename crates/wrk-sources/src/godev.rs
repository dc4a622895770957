//! Official Go release index
//!
//! `https://go.dev/dl/?mode=json` serves an array of releases shaped
//! `{"version": "goX.Y.Z", "stable": bool}`. The `go` prefix is stripped;
//! unstable releases are included only on request. Go publishes archive
//! checksums inside the index rather than as separate files, so
//! `checksum_url` is `None`.

use crate::{Error, ReleaseSource, Result};
use async_trait::async_trait;
use std::sync::Arc;
use wrk_fetch::Fetcher;
use wrk_platform::Platform;

/// Default Go download endpoint
pub const DEFAULT_BASE_URL: &str = "https://go.dev/dl";

/// Release source for the official Go toolchain
pub struct GoSource {
    fetcher: Arc<Fetcher>,
    platform: Platform,
    base_url: String,
}

impl GoSource {
    /// Create a Go release source
    pub fn new(fetcher: Arc<Fetcher>, platform: Platform) -> Self {
        Self {
            fetcher,
            platform,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the download endpoint (mirror support)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Parse the go.dev release array
pub(crate) fn parse_index(
    value: &serde_json::Value,
    include_prereleases: bool,
) -> Result<Vec<String>> {
    let releases = value
        .as_array()
        .ok_or_else(|| Error::invalid_index("go.dev", "expected array of releases"))?;

    let mut out = Vec::new();
    for release in releases {
        let Some(version) = release.get("version").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(version) = version.strip_prefix("go") else {
            continue;
        };
        let stable = release.get("stable").and_then(|s| s.as_bool()).unwrap_or(true);
        if !stable && !include_prereleases {
            continue;
        }
        out.push(version.to_string());
    }

    wrk_resolver::sort_versions_desc(&mut out);
    Ok(out)
}

#[async_trait]
impl ReleaseSource for GoSource {
    async fn list_versions(&self, include_prereleases: bool) -> Result<Vec<String>> {
        let url = format!("{}/?mode=json&include=all", self.base_url);
        tracing::debug!(url = %url, "Fetching Go release index");

        let index = self.fetcher.get_json(&url).await?;
        let versions = parse_index(&index, include_prereleases)?;

        if versions.is_empty() {
            return Err(Error::NoVersions { tool: "go".into() });
        }
        tracing::debug!(count = versions.len(), "Found Go versions");
        Ok(versions)
    }

    fn download_url(&self, version: &str) -> String {
        // go1.22.5.linux-amd64.tar.gz / go1.22.5.windows-amd64.zip
        format!(
            "{}/go{}.{}-{}{}",
            self.base_url,
            version,
            self.platform.os,
            self.platform.arch,
            self.platform.archive_extension()
        )
    }

    fn checksum_url(&self, _version: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "go.dev"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrk_platform::{Arch, Os};

    #[test]
    fn parses_release_array() {
        let index = serde_json::json!([
            {"version": "go1.22.5", "stable": true},
            {"version": "go1.23rc1", "stable": false},
            {"version": "go1.21.9", "stable": true},
        ]);

        let stable = parse_index(&index, false).unwrap();
        assert_eq!(stable, vec!["1.22.5", "1.21.9"]);

        let all = parse_index(&index, true).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn url_uses_go_naming() {
        let source = GoSource::new(
            Arc::new(Fetcher::default()),
            Platform {
                os: Os::Linux,
                arch: Arch::Arm64,
            },
        );
        assert_eq!(
            source.download_url("1.22.5"),
            "https://go.dev/dl/go1.22.5.linux-arm64.tar.gz"
        );
        assert_eq!(source.checksum_url("1.22.5"), None);
    }

    #[test]
    fn windows_gets_zip() {
        let source = GoSource::new(
            Arc::new(Fetcher::default()),
            Platform {
                os: Os::Windows,
                arch: Arch::Amd64,
            },
        );
        assert_eq!(
            source.download_url("1.22.5"),
            "https://go.dev/dl/go1.22.5.windows-amd64.zip"
        );
    }
}
