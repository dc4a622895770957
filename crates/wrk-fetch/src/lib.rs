//! wrk artifact fetcher
//!
//! Streaming HTTPS downloads with retry, a host-keyed circuit breaker and
//! mirror fallback. Downloads are atomic: the body streams to a temporary
//! file which is renamed into place only after completion and checksum
//! verification, so callers never observe partial files.

pub mod breaker;
mod checksum;
mod error;
mod fetcher;

pub use checksum::{find_in_checksum_listing, sha256_file, sha256_hex, verify_file};
pub use error::{Error, Result};
pub use fetcher::{
    filename_from_url, validate_https, validate_url, FetchOptions, Fetcher, ProgressCallback,
};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("wrk/", env!("CARGO_PKG_VERSION"));
