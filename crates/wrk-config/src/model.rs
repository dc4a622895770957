//! Manifest data model
//!
//! Shapes mirror `wrk.toml`: a project header, a `tools` table mapping
//! tool ids to version specs, named profiles layering constraint overrides,
//! a `[workenv]` settings table, an arbitrary nested `[tasks]` tree (parsed
//! lazily by the task registry) and an optional `[export]` section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the project manifest file
pub const MANIFEST_FILE: &str = "wrk.toml";

/// Environment variable prefix recognized by wrk
pub const ENV_PREFIX: &str = "WRK";

/// Version spec for a single tool
///
/// A bare string pins or constrains one version, a list declares a matrix
/// (every entry resolves and installs independently), and a table carries
/// per-tool overrides alongside the version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSpec {
    /// Single version constraint: `tools.uv = "0.5.0"`
    Version(String),
    /// Version matrix: `tools.go = ["1.22.*", "1.21.*"]`
    Matrix(Vec<String>),
    /// Full form with overrides
    Detailed {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

impl ToolSpec {
    /// All constraint expressions this spec contributes
    pub fn constraints(&self) -> Vec<String> {
        match self {
            Self::Version(v) => vec![v.clone()],
            Self::Matrix(vs) => vs.clone(),
            Self::Detailed { version, .. } => vec![version.clone()],
        }
    }

    /// Whether this spec is a matrix
    pub fn is_matrix(&self) -> bool {
        matches!(self, Self::Matrix(_))
    }

    /// The canonical constraint string used for fingerprinting
    ///
    /// Matrix entries join with `,` so the fingerprint is stable across
    /// serialization styles.
    pub fn fingerprint_string(&self) -> String {
        match self {
            Self::Version(v) => v.clone(),
            Self::Matrix(vs) => vs.join(","),
            Self::Detailed { version, .. } => version.clone(),
        }
    }
}

/// Container runtime choices for the workenv settings table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
    Nerdctl,
}

/// `[workenv]` settings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkenvSettings {
    /// Install missing tools automatically when resolving
    pub auto_install: bool,
    /// Reuse cached downloads when present
    pub use_cache: bool,
    /// How long cached catalog responses stay fresh, `\d+[smhdw]`
    pub cache_ttl: String,
    /// Log level: DEBUG, INFO, WARNING, ERROR, CRITICAL
    pub log_level: String,
    pub container_runtime: ContainerRuntime,
    pub container_registry: String,
}

impl Default for WorkenvSettings {
    fn default() -> Self {
        Self {
            auto_install: true,
            use_cache: true,
            cache_ttl: "24h".to_string(),
            log_level: "INFO".to_string(),
            container_runtime: ContainerRuntime::default(),
            container_registry: String::new(),
        }
    }
}

impl WorkenvSettings {
    /// Parse `cache_ttl` into a duration
    pub fn cache_ttl_duration(&self) -> Option<Duration> {
        parse_ttl(&self.cache_ttl)
    }
}

/// Parse a `\d+[smhdw]` duration expression
pub fn parse_ttl(s: &str) -> Option<Duration> {
    let (digits, unit) = s.split_at(s.len().checked_sub(1)?);
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        "w" => value * 604_800,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// `[export]` section listing tasks exposed to other packages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// The parsed project manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrkConfig {
    pub project_name: String,
    pub version: String,
    pub description: String,

    /// Tool version specs keyed by tool id
    pub tools: BTreeMap<String, ToolSpec>,

    /// Named profiles: tool id -> constraint override
    pub profiles: BTreeMap<String, BTreeMap<String, String>>,

    pub workenv: WorkenvSettings,

    /// Raw `[tasks]` tree, parsed by the task registry
    pub tasks: toml::Table,

    pub export: Option<ExportSection>,

    // Install behaviour
    pub install_dir: String,
    pub cache_dir: String,
    pub verify_checksums: bool,
    pub clean_on_failure: bool,
    pub include_prereleases: bool,
    pub create_symlinks: bool,

    // Task execution defaults
    pub task_runner_prefix: Option<String>,
    pub task_auto_detect: bool,

    /// Extra environment exported to every task
    pub environment: BTreeMap<String, String>,
}

impl Default for WrkConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            version: "0.1.0".to_string(),
            description: String::new(),
            tools: BTreeMap::new(),
            profiles: BTreeMap::new(),
            workenv: WorkenvSettings::default(),
            tasks: toml::Table::new(),
            export: None,
            install_dir: "~/.wrk/tools".to_string(),
            cache_dir: "~/.wrk/cache".to_string(),
            verify_checksums: true,
            clean_on_failure: true,
            include_prereleases: false,
            create_symlinks: true,
            task_runner_prefix: None,
            task_auto_detect: true,
            environment: BTreeMap::new(),
        }
    }
}

impl WrkConfig {
    /// Get the spec for a tool
    pub fn tool_spec(&self, tool: &str) -> Option<&ToolSpec> {
        self.tools.get(tool)
    }

    /// Pinned or constrained version string for a tool, if scalar
    pub fn tool_version(&self, tool: &str) -> Option<String> {
        match self.tools.get(tool)? {
            ToolSpec::Version(v) => Some(v.clone()),
            ToolSpec::Detailed { version, .. } => Some(version.clone()),
            ToolSpec::Matrix(_) => None,
        }
    }

    /// Install root with `~` expanded
    pub fn install_root(&self) -> PathBuf {
        expand_user(&self.install_dir)
    }

    /// Download cache directory with `~` expanded
    pub fn cache_root(&self) -> PathBuf {
        expand_user(&self.cache_dir)
    }

    /// Return a copy with a named profile's overrides applied
    ///
    /// Unknown profiles return the config unchanged; profile entries
    /// replace the base tool spec for that tool.
    pub fn merge_profile(&self, profile: &str) -> Self {
        let mut merged = self.clone();
        if let Some(overrides) = self.profiles.get(profile) {
            for (tool, constraint) in overrides {
                merged
                    .tools
                    .insert(tool.clone(), ToolSpec::Version(constraint.clone()));
            }
        }
        merged
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
