//! wrk lockfile engine
//!
//! Fingerprints the resolution-affecting slice of a configuration, records
//! resolved tool versions in `wrk.lock`, validates a stored lockfile
//! against the current configuration, and reinstalls from a lockfile so a
//! fresh machine reproduces the same toolchain.

mod engine;
mod fingerprint;
mod lockfile;

pub use engine::{
    CatalogProvider, DescriptorCatalog, Error, LockfileEngine, Result, SyncReport,
};
pub use fingerprint::{config_checksum, CHECKSUM_LEN};
pub use lockfile::{Lockfile, ResolvedTool, LOCKFILE_NAME};
