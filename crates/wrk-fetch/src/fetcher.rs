//! Streaming artifact downloader
//!
//! Downloads stream to a temporary file next to the destination and are
//! renamed into place only after the body is fully written and any checksum
//! has been verified, so a failed fetch never leaves a partial file behind.

use crate::checksum::{sha256_hex, verify_file};
use crate::error::{Error, Result};
use crate::{breaker, USER_AGENT};
use backon::{ExponentialBuilder, Retryable};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Progress callback invoked with `(downloaded_bytes, total_bytes)`
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Options for a single fetch operation
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Expected SHA-256 of the downloaded file; verified after completion
    /// and the file is removed on mismatch
    pub checksum: Option<String>,
    /// Optional progress callback
    pub progress: Option<ProgressCallback>,
}

impl FetchOptions {
    /// Set the expected checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Set the progress callback
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// HTTP fetcher with retry, circuit breaker and mirror fallback
pub struct Fetcher {
    client: reqwest::Client,
    max_retries: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl Fetcher {
    /// Default maximum retry attempts
    const DEFAULT_MAX_RETRIES: usize = 3;
    /// Default minimum retry delay
    const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
    /// Default maximum retry delay
    const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            min_delay: Self::DEFAULT_MIN_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        })
    }

    /// Create a fetcher with a custom client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            min_delay: Self::DEFAULT_MIN_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    /// Set the maximum number of retry attempts
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the minimum retry delay
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Build the retry strategy using backon
    fn build_retry_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    /// Download a file from a URL to the given destination
    ///
    /// Retries on network failures with exponential backoff. Each attempt
    /// consults the host's circuit breaker first, so a host that has failed
    /// repeatedly fails fast without touching the network.
    pub async fn fetch(&self, url: &str, destination: &Path, options: &FetchOptions) -> Result<()> {
        validate_url(url)?;

        (|| async {
            breaker::check(url)?;
            let result = self.fetch_once(url, destination, options).await;
            match &result {
                Ok(()) => breaker::record_success(url),
                // Checksum mismatches are the server handing us the wrong
                // bytes successfully; only network faults trip the breaker.
                Err(e) if e.is_network_error() => breaker::record_failure(url),
                Err(_) => {}
            }
            result
        })
        .retry(self.build_retry_strategy())
        .notify(|err: &Error, dur: Duration| {
            warn!("Download failed: {}, retrying in {:?}", err, dur);
        })
        .when(|e| e.is_recoverable())
        .await
    }

    /// Download a file trying multiple mirror URLs until one succeeds
    ///
    /// Mirrors are tried in order; a mirror failure is logged at debug and
    /// the next mirror is attempted. The call fails only when every mirror
    /// has failed.
    pub async fn fetch_with_mirrors(
        &self,
        urls: &[String],
        destination: &Path,
        options: &FetchOptions,
    ) -> Result<()> {
        if urls.is_empty() {
            return Err(Error::invalid_url("", "mirror list is empty"));
        }

        let mut last_error = String::new();
        for url in urls {
            if let Err(e) = validate_url(url) {
                debug!(url = %url, error = %e, "Skipping invalid mirror");
                last_error = e.to_string();
                continue;
            }
            match self.fetch_once(url, destination, options).await {
                Ok(()) => return Ok(()),
                Err(e @ Error::ChecksumMismatch { .. }) => {
                    // Wrong bytes are wrong everywhere; don't hammer mirrors
                    return Err(e);
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Mirror failed, trying next");
                    last_error = e.to_string();
                }
            }
        }

        Err(Error::AllMirrorsFailed {
            count: urls.len(),
            last_error,
        })
    }

    /// Single download attempt without retry logic
    async fn fetch_once(&self, url: &str, destination: &Path, options: &FetchOptions) -> Result<()> {
        debug!(url = %url, dest = %destination.display(), "Downloading");

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::NetworkTimeout {
                    url: url.to_string(),
                }
            } else {
                Error::download_failed(url, format!("Connection error: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(Error::download_failed(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        let temp_path = part_path(destination);

        let write_result = self
            .stream_to_file(url, response, &temp_path, total_size, options)
            .await;

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Some(expected) = &options.checksum {
            if let Err(e) = verify_file(&temp_path, expected) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(match e {
                    Error::ChecksumMismatch { expected, actual, .. } => Error::ChecksumMismatch {
                        file_path: destination.to_path_buf(),
                        expected,
                        actual,
                    },
                    other => other,
                });
            }
        }

        std::fs::rename(&temp_path, destination)?;
        debug!(dest = %destination.display(), "Download complete");
        Ok(())
    }

    async fn stream_to_file(
        &self,
        url: &str,
        response: reqwest::Response,
        temp_path: &Path,
        total_size: Option<u64>,
        options: &FetchOptions,
    ) -> Result<()> {
        use std::io::Write;

        let mut file = std::fs::File::create(temp_path)?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    Error::NetworkTimeout {
                        url: url.to_string(),
                    }
                } else {
                    Error::download_failed(url, format!("Stream error: {}", e))
                }
            })?;

            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;

            if let Some(progress) = &options.progress {
                progress(downloaded, total_size);
            }
        }

        file.flush()?;
        Ok(())
    }

    /// Fetch a text document (checksum listings, release indexes)
    ///
    /// Catalog endpoints must be HTTPS; plain HTTP responses could be
    /// tampered with in transit and there is no checksum to catch it.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        validate_https(url)?;

        (|| async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| Error::download_failed(url, e.to_string()))?;

            if !response.status().is_success() {
                return Err(Error::download_failed(
                    url,
                    format!("HTTP {}", response.status()),
                ));
            }

            response
                .text()
                .await
                .map_err(|e| Error::download_failed(url, e.to_string()))
        })
        .retry(self.build_retry_strategy())
        .when(|e: &Error| e.is_recoverable())
        .await
    }

    /// Fetch and parse a JSON document
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new().expect("Failed to create default fetcher")
    }
}

/// Validate that a download URL is well formed and uses http or https
pub fn validate_url(url: &str) -> Result<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(Error::invalid_url(url, "missing scheme"));
    };
    if !matches!(scheme.to_lowercase().as_str(), "http" | "https") {
        return Err(Error::invalid_url(url, format!("scheme '{}' not allowed", scheme)));
    }
    if rest.is_empty() || rest.starts_with('/') {
        return Err(Error::invalid_url(url, "missing host"));
    }
    Ok(())
}

/// Validate that a URL uses https
pub fn validate_https(url: &str) -> Result<()> {
    validate_url(url)?;
    if !url.to_lowercase().starts_with("https://") {
        return Err(Error::invalid_url(url, "only HTTPS is allowed"));
    }
    Ok(())
}

/// Extract a filename from a download URL
///
/// Falls back to a deterministic name derived from the URL hash when the
/// path has no usable final segment.
pub fn filename_from_url(url: &str) -> String {
    let path = url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split_once('/').map(|(_, p)| p))
        .unwrap_or("");
    let filename = path.split('/').next_back().unwrap_or("").split('?').next().unwrap_or("");

    if filename.is_empty() {
        format!("dl-{}", &sha256_hex(url)[..16])
    } else {
        filename.to_string()
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!("{}.part", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com/file.zip").is_ok());
        assert!(validate_url("http://example.com/file.zip").is_ok());
        assert!(validate_url("ftp://example.com/file.zip").is_err());
        assert!(validate_url("example.com/file.zip").is_err());
        assert!(validate_url("https:///file.zip").is_err());
    }

    #[test]
    fn https_only_for_catalogs() {
        assert!(validate_https("https://example.com/index.json").is_ok());
        assert!(validate_https("http://example.com/index.json").is_err());
    }

    #[test]
    fn filename_extraction() {
        assert_eq!(filename_from_url("https://example.com/file.zip"), "file.zip");
        assert_eq!(
            filename_from_url("https://example.com/a/b/file.zip?token=1"),
            "file.zip"
        );
        let fallback = filename_from_url("https://example.com/");
        assert!(fallback.starts_with("dl-"));
        assert_eq!(fallback.len(), 3 + 16);
        // Deterministic
        assert_eq!(fallback, filename_from_url("https://example.com/"));
    }

    #[test]
    fn part_path_sits_next_to_destination() {
        let p = part_path(Path::new("/tmp/cache/tool.tar.gz"));
        assert_eq!(p, Path::new("/tmp/cache/tool.tar.gz.part"));
    }
}
