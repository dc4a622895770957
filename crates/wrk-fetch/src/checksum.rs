//! SHA-256 checksum helpers and checksum-file parsing

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Calculate the SHA-256 checksum of a file, hex-encoded
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(bytes_to_hex(&hasher.finalize()))
}

/// Calculate the SHA-256 checksum of a string, hex-encoded
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// Render raw bytes as a lowercase hex string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Verify a file against an expected hex checksum
///
/// Comparison is case-insensitive. Returns `Error::ChecksumMismatch` on
/// failure; the caller decides whether to delete the file.
pub fn verify_file(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!(file = %path.display(), "Checksum verified");
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            file_path: path.to_path_buf(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Find the checksum for a file in a `SHA256SUMS`-style listing
///
/// Each non-comment line is `<hex>  <filename>`; a leading `*` on the
/// filename (binary-mode marker) is ignored. Matches the exact filename or
/// a path entry ending with it.
pub fn find_in_checksum_listing(listing: &str, target_filename: &str) -> Option<String> {
    for line in listing.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let checksum = parts.next()?;
        let Some(filename) = parts.next() else {
            continue;
        };
        let filename = filename.trim_start_matches('*');

        if filename == target_filename || filename.ends_with(&format!("/{}", target_filename)) {
            tracing::debug!(file = target_filename, "Found checksum entry");
            return Some(checksum.to_string());
        }
    }

    tracing::warn!(file = target_filename, "No checksum entry found in listing");
    None
}
