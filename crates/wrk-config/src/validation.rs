//! Manifest validation
//!
//! Enforces the invariants a parsed manifest must satisfy before any other
//! component consumes it: project naming, setting grammars, constraint
//! syntax and task-tree depth.

use crate::error::{Error, Result};
use crate::model::{parse_ttl, WrkConfig};
use once_cell::sync::Lazy;
use regex::Regex;

static PROJECT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").expect("static regex"));

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Maximum nesting depth of the `[tasks]` tree
pub const MAX_TASK_DEPTH: usize = 3;

impl WrkConfig {
    /// Validate the manifest invariants
    pub fn validate(&self) -> Result<()> {
        if !PROJECT_NAME_RE.is_match(&self.project_name) {
            return Err(Error::validation(
                "project_name",
                format!(
                    "'{}' must be 1-100 characters of [A-Za-z0-9._-]",
                    self.project_name
                ),
            ));
        }

        if !LOG_LEVELS.contains(&self.workenv.log_level.to_uppercase().as_str()) {
            return Err(Error::validation(
                "workenv.log_level",
                format!(
                    "'{}' is not one of {}",
                    self.workenv.log_level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        if parse_ttl(&self.workenv.cache_ttl).is_none() {
            return Err(Error::validation(
                "workenv.cache_ttl",
                format!("'{}' does not match \\d+[smhdw]", self.workenv.cache_ttl),
            ));
        }

        for (tool, spec) in &self.tools {
            for constraint in spec.constraints() {
                wrk_resolver::Constraint::parse(&constraint).map_err(|_| {
                    Error::validation(
                        format!("tools.{}", tool),
                        format!("invalid version constraint '{}'", constraint),
                    )
                })?;
            }
        }

        for (profile, overrides) in &self.profiles {
            for (tool, constraint) in overrides {
                wrk_resolver::Constraint::parse(constraint).map_err(|_| {
                    Error::validation(
                        format!("profiles.{}.{}", profile, tool),
                        format!("invalid version constraint '{}'", constraint),
                    )
                })?;
            }
        }

        check_task_depth(&self.tasks, 1)?;

        Ok(())
    }
}

/// A table without a `run` key is a namespace; recurse and bound the depth
fn check_task_depth(table: &toml::Table, depth: usize) -> Result<()> {
    if depth > MAX_TASK_DEPTH {
        return Err(Error::validation(
            "tasks",
            format!("task nesting too deep (max {} levels)", MAX_TASK_DEPTH),
        ));
    }

    for (name, value) in table {
        if let toml::Value::Table(nested) = value {
            if !nested.contains_key("run") {
                check_task_depth(nested, depth + 1).map_err(|_| {
                    Error::validation(
                        format!("tasks.{}", name),
                        format!("task nesting too deep (max {} levels)", MAX_TASK_DEPTH),
                    )
                })?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolSpec;
    use rstest::rstest;

    fn valid() -> WrkConfig {
        WrkConfig {
            project_name: "my-project".into(),
            ..Default::default()
        }
    }

    #[test]
    fn default_named_config_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("has spaces")]
    #[case("emoji💥")]
    fn bad_project_names(#[case] name: &str) {
        let mut config = valid();
        config.project_name = name.into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_log_level() {
        let mut config = valid();
        config.workenv.log_level = "LOUD".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_cache_ttl() {
        let mut config = valid();
        config.workenv.cache_ttl = "soon".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_tool_constraint() {
        let mut config = valid();
        config
            .tools
            .insert("uv".into(), ToolSpec::Version("not a version".into()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_profile_constraint() {
        let mut config = valid();
        config.profiles.insert(
            "ci".into(),
            [("uv".to_string(), "???".to_string())].into_iter().collect(),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn task_depth_limit() {
        let mut config = valid();
        config.tasks = toml::toml! {
            [test.unit.fast]
            run = "pytest -k fast"
        };
        assert!(config.validate().is_ok());

        config.tasks = toml::toml! {
            [a.b.c.d]
            run = "too deep"
        };
        assert!(config.validate().is_err());
    }
}
