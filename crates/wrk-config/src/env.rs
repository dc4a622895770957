//! Environment variable overrides
//!
//! The regular settings map cleanly onto `WRK_*` names, but tool versions
//! and profile overrides use positional formats
//! (`WRK_<TOOL>_VERSION`, `WRK_TOOL_<TOOL>_VERSION`,
//! `WRK_PROFILE_<NAME>_<TOOL>`) that a generic nested-env provider cannot
//! express, so the overlay is applied by hand after the file layers merge.

use crate::model::{ContainerRuntime, ToolSpec, WrkConfig, ENV_PREFIX};
use std::collections::BTreeMap;

/// Coerce a configuration string to a boolean
///
/// `true/1/yes/on` and `false/0/no/off` (any case); anything else is None.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Names that look like `WRK_<X>_VERSION` but are not tool overrides
const RESERVED_VERSION_NAMES: &[&str] = &["project", "wrk", "manager"];

/// The active profile name
///
/// `WRK_PROFILE` wins, then plain `PROFILE`; absent means the caller falls
/// back to the metadata ledger and finally `"default"`.
pub fn active_profile_from(vars: &BTreeMap<String, String>) -> Option<String> {
    vars.get("WRK_PROFILE")
        .or_else(|| vars.get("PROFILE"))
        .filter(|v| !v.is_empty())
        .cloned()
}

/// Read the active profile from the process environment
pub fn active_profile() -> Option<String> {
    active_profile_from(&std::env::vars().collect())
}

impl WrkConfig {
    /// Apply recognized `WRK_*` overrides from the given variable map
    pub fn apply_env_overrides_from(&mut self, vars: &BTreeMap<String, String>) {
        let get = |suffix: &str| vars.get(&format!("{}_{}", ENV_PREFIX, suffix));

        if let Some(v) = get("PROJECT_NAME") {
            self.project_name = v.clone();
        }
        if let Some(v) = get("VERSION") {
            self.version = v.clone();
        }
        if let Some(v) = get("DESCRIPTION") {
            self.description = v.clone();
        }
        if let Some(b) = get("AUTO_INSTALL").and_then(|v| parse_bool(v)) {
            self.workenv.auto_install = b;
        }
        if let Some(b) = get("USE_CACHE").and_then(|v| parse_bool(v)) {
            self.workenv.use_cache = b;
        }
        if let Some(v) = get("CACHE_TTL") {
            self.workenv.cache_ttl = v.clone();
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.workenv.log_level = v.to_uppercase();
        }
        if let Some(v) = get("CONTAINER_RUNTIME") {
            self.workenv.container_runtime = match v.to_lowercase().as_str() {
                "podman" => ContainerRuntime::Podman,
                "nerdctl" => ContainerRuntime::Nerdctl,
                _ => ContainerRuntime::Docker,
            };
        }
        if let Some(v) = get("CONTAINER_REGISTRY") {
            self.workenv.container_registry = v.clone();
        }
        if let Some(v) = get("TASK_RUNNER") {
            self.task_runner_prefix = Some(v.clone());
        }

        for (tool, version) in tool_versions_from(vars) {
            self.tools.insert(tool, ToolSpec::Version(version));
        }

        for (profile, tool, version) in profile_overrides_from(vars) {
            self.profiles.entry(profile).or_default().insert(tool, version);
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(&std::env::vars().collect());
    }
}

/// Extract tool version overrides from the variable map
///
/// Both `WRK_<TOOL>_VERSION` and `WRK_TOOL_<TOOL>_VERSION` are accepted;
/// the explicit `TOOL_` form wins when both are set.
fn tool_versions_from(vars: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut tools = BTreeMap::new();
    let short_prefix = format!("{}_", ENV_PREFIX);
    let tool_prefix = format!("{}_TOOL_", ENV_PREFIX);

    for (key, value) in vars {
        let Some(stem) = key.strip_suffix("_VERSION") else {
            continue;
        };
        if let Some(tool) = stem.strip_prefix(&tool_prefix) {
            if !tool.is_empty() {
                tools.insert(tool.to_lowercase(), value.clone());
            }
        } else if let Some(tool) = stem.strip_prefix(&short_prefix) {
            let tool = tool.to_lowercase();
            if tool.is_empty()
                || tool.contains('_')
                || RESERVED_VERSION_NAMES.contains(&tool.as_str())
                || tools.contains_key(&tool)
            {
                continue;
            }
            tools.insert(tool, value.clone());
        }
    }

    tools
}

/// Extract `WRK_PROFILE_<NAME>_<TOOL>` overrides from the variable map
fn profile_overrides_from(vars: &BTreeMap<String, String>) -> Vec<(String, String, String)> {
    let prefix = format!("{}_PROFILE_", ENV_PREFIX);
    let mut overrides = Vec::new();

    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        // WRK_PROFILE itself selects the active profile, not an override
        let Some((profile, tool)) = rest.split_once('_') else {
            continue;
        };
        if profile.is_empty() || tool.is_empty() {
            continue;
        }
        overrides.push((profile.to_lowercase(), tool.to_lowercase(), value.clone()));
    }

    overrides
}
