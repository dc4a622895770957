//! Configuration fingerprinting
//!
//! The fingerprint covers exactly the slice of configuration that affects
//! resolution: project name, project version, each tool's constraint
//! string, and the profiles. Task definitions, environment, descriptions
//! and cosmetic settings deliberately do not contribute, so editing a task
//! never invalidates a lockfile.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use wrk_config::WrkConfig;

/// Hex characters kept from the SHA-256 digest
pub const CHECKSUM_LEN: usize = 12;

/// The canonical, resolution-affecting slice of a configuration
///
/// `BTreeMap` keys serialize sorted, and serde_json emits no insignificant
/// whitespace, so two configurations with the same semantic content always
/// produce identical bytes.
#[derive(Serialize)]
struct FingerprintSlice<'a> {
    project_name: &'a str,
    version: &'a str,
    tools: BTreeMap<&'a str, String>,
    profiles: BTreeMap<&'a str, BTreeMap<&'a str, &'a str>>,
}

/// Compute the 12-hex-character configuration fingerprint
pub fn config_checksum(config: &WrkConfig) -> String {
    let slice = FingerprintSlice {
        project_name: &config.project_name,
        version: &config.version,
        tools: config
            .tools
            .iter()
            .map(|(id, spec)| (id.as_str(), spec.fingerprint_string()))
            .collect(),
        profiles: config
            .profiles
            .iter()
            .map(|(name, overrides)| {
                (
                    name.as_str(),
                    overrides
                        .iter()
                        .map(|(tool, constraint)| (tool.as_str(), constraint.as_str()))
                        .collect(),
                )
            })
            .collect(),
    };

    let canonical = serde_json::to_string(&slice).expect("fingerprint slice serializes");
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..CHECKSUM_LEN].to_string()
}
