//! Lockfile data model

use crate::fingerprint::config_checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wrk_config::WrkConfig;

/// Name of the lockfile next to the manifest
pub const LOCKFILE_NAME: &str = "wrk.lock";

fn default_manager_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// One resolved tool entry
///
/// Scalar specs key as `<tool>`, matrix entries as `<tool>@<version>`;
/// in both cases `name` is the bare tool id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTool {
    pub name: String,
    /// Fully resolved concrete version
    pub version: String,
    /// The original constraint expression this version came from
    pub resolved_from: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub installed_at: Option<String>,
    #[serde(default)]
    pub install_path: Option<String>,
}

/// The lockfile: a reproducible record of one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    /// 12-hex-char fingerprint of the configuration slice that produced
    /// this resolution
    pub config_checksum: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default = "default_manager_version")]
    pub manager_version: String,
    #[serde(default)]
    pub resolved_tools: BTreeMap<String, ResolvedTool>,
}

impl Lockfile {
    /// Create an empty lockfile fingerprinting the given configuration
    pub fn from_config(config: &WrkConfig) -> Self {
        Self {
            config_checksum: config_checksum(config),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            manager_version: default_manager_version(),
            resolved_tools: BTreeMap::new(),
        }
    }

    /// Record a scalar resolution under the bare tool id
    pub fn add_resolved_tool(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        resolved_from: impl Into<String>,
    ) {
        let name = name.into();
        let version = version.into();
        self.resolved_tools.insert(
            name.clone(),
            ResolvedTool {
                name,
                version,
                resolved_from: resolved_from.into(),
                checksum: None,
                installed_at: None,
                install_path: None,
            },
        );
    }

    /// Record a matrix resolution under `<tool>@<version>`
    pub fn add_matrix_entry(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        resolved_from: impl Into<String>,
    ) {
        let name = name.into();
        let version = version.into();
        let key = format!("{}@{}", name, version);
        self.resolved_tools.insert(
            key,
            ResolvedTool {
                name,
                version,
                resolved_from: resolved_from.into(),
                checksum: None,
                installed_at: None,
                install_path: None,
            },
        );
    }

    /// Resolved version for a scalar tool entry
    pub fn resolved_version(&self, tool: &str) -> Option<&str> {
        self.resolved_tools.get(tool).map(|t| t.version.as_str())
    }

    /// Whether a scalar entry carries an install timestamp
    pub fn is_tool_installed(&self, tool: &str) -> bool {
        self.resolved_tools
            .get(tool)
            .is_some_and(|t| t.installed_at.is_some())
    }

    /// Whether a key is a matrix entry
    pub fn is_matrix_key(key: &str) -> bool {
        key.contains('@')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_fingerprints() {
        let config = WrkConfig {
            project_name: "demo".into(),
            ..Default::default()
        };
        let lockfile = Lockfile::from_config(&config);
        assert_eq!(lockfile.config_checksum.len(), 12);
        assert!(lockfile.created_at.is_some());
        assert_eq!(lockfile.manager_version, env!("CARGO_PKG_VERSION"));
        assert!(lockfile.resolved_tools.is_empty());
    }

    #[test]
    fn scalar_and_matrix_keys() {
        let mut lockfile = Lockfile {
            config_checksum: "abc123def456".into(),
            created_at: None,
            manager_version: default_manager_version(),
            resolved_tools: BTreeMap::new(),
        };
        lockfile.add_resolved_tool("uv", "0.5.0", "0.5.*");
        lockfile.add_matrix_entry("go", "1.22.5", "1.22.*");

        assert_eq!(lockfile.resolved_version("uv"), Some("0.5.0"));
        let entry = &lockfile.resolved_tools["go@1.22.5"];
        assert_eq!(entry.name, "go");
        assert_eq!(entry.resolved_from, "1.22.*");
        assert!(Lockfile::is_matrix_key("go@1.22.5"));
        assert!(!Lockfile::is_matrix_key("uv"));
    }

    #[test]
    fn minimal_json_deserializes() {
        let lockfile: Lockfile = serde_json::from_str(
            r#"{"config_checksum": "abc123def456", "resolved_tools": {}}"#,
        )
        .unwrap();
        assert_eq!(lockfile.config_checksum, "abc123def456");
        assert_eq!(lockfile.created_at, None);
        assert_eq!(lockfile.manager_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn round_trips_bytewise() {
        let mut lockfile = Lockfile {
            config_checksum: "abc123def456".into(),
            created_at: Some("2025-01-01T00:00:00+00:00".into()),
            manager_version: "0.3.0".into(),
            resolved_tools: BTreeMap::new(),
        };
        lockfile.add_resolved_tool("uv", "0.5.0", "0.5.*");

        let first = serde_json::to_string_pretty(&lockfile).unwrap();
        let reparsed: Lockfile = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&reparsed).unwrap();
        assert_eq!(lockfile, reparsed);
        assert_eq!(first, second);
    }
}
