//! Layered manifest loading
//!
//! Built-in defaults, then `wrk.toml` from the project directory, then
//! `WRK_*` environment overrides. The figment layers give later sources
//! precedence; the irregular env formats are overlaid afterwards.

use crate::error::Result;
use crate::model::{WrkConfig, MANIFEST_FILE};
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use std::path::Path;

impl WrkConfig {
    /// Load the manifest for a project directory
    ///
    /// A missing `wrk.toml` yields the defaults (with env overrides still
    /// applied); a malformed one is an error.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let manifest = project_dir.join(MANIFEST_FILE);

        let mut config: WrkConfig = Figment::from(Serialized::defaults(WrkConfig::default()))
            .merge(Toml::file(&manifest))
            .extract()?;

        config.apply_env_overrides();

        tracing::debug!(
            manifest = %manifest.display(),
            tools = config.tools.len(),
            profiles = config.profiles.len(),
            "Loaded configuration"
        );

        Ok(config)
    }

    /// Load without touching the process environment
    ///
    /// Used by tests and by callers that manage their own overrides.
    pub fn load_file_only(project_dir: &Path) -> Result<Self> {
        let manifest = project_dir.join(MANIFEST_FILE);
        let config = Figment::from(Serialized::defaults(WrkConfig::default()))
            .merge(Toml::file(&manifest))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolSpec;

    #[test]
    fn loads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"
project_name = "demo"
version = "1.0.0"

[tools]
uv = "0.5.0"
go = ["1.22.*", "1.21.*"]

[profiles.ci]
uv = "latest"

[workenv]
auto_install = false
cache_ttl = "1h"

[tasks.test]
run = "pytest"

[export]
tasks = ["test"]
"#,
        )
        .unwrap();

        let config = WrkConfig::load_file_only(dir.path()).unwrap();

        assert_eq!(config.project_name, "demo");
        assert_eq!(config.tool_version("uv").as_deref(), Some("0.5.0"));
        assert_eq!(
            config.tools["go"],
            ToolSpec::Matrix(vec!["1.22.*".into(), "1.21.*".into()])
        );
        assert_eq!(config.profiles["ci"]["uv"], "latest");
        assert!(!config.workenv.auto_install);
        assert_eq!(config.workenv.cache_ttl, "1h");
        assert!(config.tasks.contains_key("test"));
        assert!(config.validate().is_ok());
        assert_eq!(config.export.unwrap().tasks, vec!["test"]);
    }

    #[test]
    fn missing_manifest_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WrkConfig::load_file_only(dir.path()).unwrap();
        assert!(config.project_name.is_empty());
        assert!(config.workenv.auto_install);
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "project_name = [not toml").unwrap();
        assert!(WrkConfig::load_file_only(dir.path()).is_err());
    }
}
