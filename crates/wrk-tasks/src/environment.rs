//! Task execution environment detection
//!
//! Decides, per project directory, whether task commands run through the
//! package manager's runner (`uv run ...`) or directly with the project's
//! virtual environment prepended to PATH. Detection order:
//!
//! 1. `WRK_TASK_RUNNER` override (its value is the prefix, verbatim; empty
//!    means "no prefix")
//! 2. Virtual environment discovery (workenv pattern, `.venv`, `venv`,
//!    the ambient `VIRTUAL_ENV`)
//! 3. Package-manager project markers (`uv.lock`, `[tool.uv]`)
//! 4. Editable-install detection (dist-info `direct_url.json`, editable
//!    `.pth` markers, `src/` layout)
//!
//! An editable install always wins direct execution: routing through the
//! runner would re-sync the environment and clobber the editable state.

use crate::schema::ExecutionMode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use wrk_platform::Platform;

/// Environment variable overriding the runner prefix
pub const TASK_RUNNER_ENV: &str = "WRK_TASK_RUNNER";

/// The package-manager runner prefix
pub const RUNNER_PREFIX: &str = "uv run";

/// Detected execution environment for one project directory
#[derive(Debug, Clone)]
pub struct ExecutionEnvironment {
    pub project_dir: PathBuf,
    pub package_name: String,
    pub mode: ExecutionMode,
    pub venv_path: Option<PathBuf>,
    pub is_package_manager_project: bool,
    pub package_is_editable: bool,
    pub use_runner_prefix: bool,
    pub override_from_env: Option<String>,
    platform: Platform,
}

impl ExecutionEnvironment {
    /// Detect the execution environment for a project
    pub fn new(project_dir: &Path, package_name: Option<&str>, mode: ExecutionMode) -> Self {
        let override_from_env = std::env::var(TASK_RUNNER_ENV).ok();
        let ambient_venv = std::env::var("VIRTUAL_ENV").ok().map(PathBuf::from);
        Self::detect(project_dir, package_name, mode, override_from_env, ambient_venv)
    }

    /// Detection with explicit ambient inputs
    ///
    /// The entry point for tests; `new` feeds in the real process
    /// environment.
    pub fn detect(
        project_dir: &Path,
        package_name: Option<&str>,
        mode: ExecutionMode,
        override_from_env: Option<String>,
        ambient_venv: Option<PathBuf>,
    ) -> Self {
        let package_name = package_name
            .map(|s| s.to_string())
            .or_else(|| {
                project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        let platform = Platform::current();

        let mut env = Self {
            project_dir: project_dir.to_path_buf(),
            package_name,
            mode,
            venv_path: None,
            is_package_manager_project: false,
            package_is_editable: false,
            use_runner_prefix: false,
            override_from_env,
            platform,
        };

        // Priority 1: explicit override decides everything
        if let Some(runner) = &env.override_from_env {
            debug!(runner = %runner, "Task runner override from environment");
            env.use_runner_prefix = runner == RUNNER_PREFIX;
            return env;
        }

        // Priority 2: detect the environment components
        env.venv_path = env.detect_venv(ambient_venv);
        env.is_package_manager_project = env.detect_package_manager_project();
        env.package_is_editable = env.detect_editable_install();

        // Priority 3: mode-specific decision
        match mode {
            ExecutionMode::UvRun => env.use_runner_prefix = true,
            ExecutionMode::Direct => env.use_runner_prefix = false,
            ExecutionMode::System => {
                env.use_runner_prefix = false;
                env.venv_path = None;
            }
            ExecutionMode::Auto => {
                if env.package_is_editable {
                    env.use_runner_prefix = false;
                    debug!(
                        package = %env.package_name,
                        "Editable install detected, using direct execution"
                    );
                } else if env.is_package_manager_project {
                    env.use_runner_prefix = true;
                    debug!("Package-manager project detected, using runner prefix");
                } else {
                    env.use_runner_prefix = false;
                    debug!("Using direct execution with PATH modification");
                }
            }
        }

        debug!(
            venv = ?env.venv_path,
            pm_project = env.is_package_manager_project,
            editable = env.package_is_editable,
            runner_prefix = env.use_runner_prefix,
            mode = ?mode,
            "Environment detection complete"
        );
        env
    }

    /// Find a virtual environment, in priority order
    fn detect_venv(&self, ambient_venv: Option<PathBuf>) -> Option<PathBuf> {
        let marker = "pyvenv.cfg";

        // Priority 1: the workenv pattern
        let workenv = self.project_dir.join("workenv").join(format!(
            "{}_{}",
            self.package_name,
            self.platform.platform_string()
        ));
        if workenv.join(marker).exists() {
            return Some(workenv);
        }

        // Priority 2 and 3: conventional venv directories
        for name in [".venv", "venv"] {
            let candidate = self.project_dir.join(name);
            if candidate.join(marker).exists() {
                return Some(candidate);
            }
        }

        // Priority 4: the venv this process already runs inside
        ambient_venv.filter(|p| p.join(marker).exists() || p.is_dir())
    }

    /// Whether the project is driven by the package manager
    fn detect_package_manager_project(&self) -> bool {
        if self.project_dir.join("uv.lock").exists() {
            return true;
        }

        let pyproject = self.project_dir.join("pyproject.toml");
        if let Ok(text) = std::fs::read_to_string(pyproject) {
            if let Ok(table) = text.parse::<toml::Table>() {
                return table
                    .get("tool")
                    .and_then(|t| t.as_table())
                    .is_some_and(|t| t.contains_key("uv"));
            }
        }
        false
    }

    /// Whether the package is installed editable into the venv
    fn detect_editable_install(&self) -> bool {
        let Some(site_packages) = self.site_packages_dir() else {
            return false;
        };
        let normalized = self.package_name.replace('-', "_");

        // Modern: direct_url.json inside the dist-info, editable flag set
        if let Ok(entries) = std::fs::read_dir(&site_packages) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(&format!("{}-", normalized)) && name.ends_with(".dist-info") {
                    if let Ok(text) = std::fs::read_to_string(entry.path().join("direct_url.json"))
                    {
                        if let Ok(direct_url) = serde_json::from_str::<serde_json::Value>(&text) {
                            if direct_url
                                .pointer("/dir_info/editable")
                                .and_then(|v| v.as_bool())
                                .unwrap_or(false)
                            {
                                return true;
                            }
                        }
                    }
                }

                // Editable-install marker files
                if name.starts_with("__editable__") && name.contains(&normalized) {
                    return true;
                }
            }
        }

        // Legacy fallback: the package lives under src/ in this project
        self.project_dir.join("src").join(&normalized).is_dir()
            && site_packages.join(format!("{}.pth", normalized)).exists()
    }

    /// The venv's site-packages directory, when a venv was found
    fn site_packages_dir(&self) -> Option<PathBuf> {
        let venv = self.venv_path.as_ref()?;
        if self.platform.os.is_windows() {
            let candidate = venv.join("Lib").join("site-packages");
            return candidate.is_dir().then_some(candidate);
        }
        let lib = venv.join("lib");
        for entry in std::fs::read_dir(lib).ok()?.flatten() {
            if entry.file_name().to_string_lossy().starts_with("python") {
                let candidate = entry.path().join("site-packages");
                if candidate.is_dir() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Apply the runner prefix rules to a command
    ///
    /// Precedence: per-task prefix (empty string means "explicitly no
    /// prefix", beating the env override) > env override > detected
    /// runner prefix.
    pub fn prepare_command(&self, command: &str, prefix_override: Option<&str>) -> String {
        if let Some(prefix) = prefix_override {
            if prefix.is_empty() {
                return command.to_string();
            }
            return format!("{} {}", prefix, command);
        }

        if let Some(runner) = &self.override_from_env {
            if runner.is_empty() {
                return command.to_string();
            }
            return format!("{} {}", runner, command);
        }

        if self.use_runner_prefix {
            return format!("{} {}", RUNNER_PREFIX, command);
        }

        command.to_string()
    }

    /// Build the child environment, prepending the venv to PATH when
    /// running directly
    pub fn prepare_environment(
        &self,
        base_env: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut env = base_env.clone();

        // The runner manages its own environment
        if self.use_runner_prefix {
            return env;
        }

        let Some(venv) = &self.venv_path else {
            return env;
        };

        let bin_dir = venv.join(self.platform.venv_bin_dir());
        if bin_dir.exists() {
            let current = env
                .get("PATH")
                .cloned()
                .or_else(|| std::env::var("PATH").ok())
                .unwrap_or_default();
            env.insert(
                "PATH".to_string(),
                format!("{}{}{}", bin_dir.display(), self.platform.path_separator(), current),
            );
        }

        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn project() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn make_venv(dir: &Path, name: &str) -> PathBuf {
        let venv = dir.join(name);
        std::fs::create_dir_all(&venv).unwrap();
        std::fs::write(venv.join("pyvenv.cfg"), "home = /usr/bin\n").unwrap();
        let platform = Platform::current();
        std::fs::create_dir_all(venv.join(platform.venv_bin_dir())).unwrap();
        venv
    }

    fn detect(dir: &Path, mode: ExecutionMode) -> ExecutionEnvironment {
        ExecutionEnvironment::detect(dir, Some("mypkg"), mode, None, None)
    }

    #[test]
    fn override_wins_and_sets_runner_flag() {
        let dir = project();
        let env = ExecutionEnvironment::detect(
            dir.path(),
            Some("mypkg"),
            ExecutionMode::Auto,
            Some("uv run".into()),
            None,
        );
        assert!(env.use_runner_prefix);
        assert_eq!(env.prepare_command("pytest", None), "uv run pytest");

        let custom = ExecutionEnvironment::detect(
            dir.path(),
            Some("mypkg"),
            ExecutionMode::Auto,
            Some("poetry run".into()),
            None,
        );
        assert!(!custom.use_runner_prefix);
        assert_eq!(custom.prepare_command("pytest", None), "poetry run pytest");

        // Empty override means "explicitly no prefix"
        let none = ExecutionEnvironment::detect(
            dir.path(),
            Some("mypkg"),
            ExecutionMode::Auto,
            Some(String::new()),
            None,
        );
        assert_eq!(none.prepare_command("pytest", None), "pytest");
    }

    #[test]
    fn venv_discovery_priority() {
        let dir = project();
        make_venv(dir.path(), "venv");
        let env = detect(dir.path(), ExecutionMode::Auto);
        assert!(env.venv_path.as_ref().unwrap().ends_with("venv"));

        make_venv(dir.path(), ".venv");
        let env = detect(dir.path(), ExecutionMode::Auto);
        assert!(env.venv_path.as_ref().unwrap().ends_with(".venv"));

        let workenv_name = format!("mypkg_{}", Platform::current().platform_string());
        make_venv(&dir.path().join("workenv"), &workenv_name);
        let env = detect(dir.path(), ExecutionMode::Auto);
        assert!(env.venv_path.as_ref().unwrap().ends_with(&workenv_name));
    }

    #[test]
    fn package_manager_markers() {
        let dir = project();
        assert!(!detect(dir.path(), ExecutionMode::Auto).is_package_manager_project);

        std::fs::write(dir.path().join("uv.lock"), "").unwrap();
        assert!(detect(dir.path(), ExecutionMode::Auto).is_package_manager_project);

        let dir2 = project();
        std::fs::write(
            dir2.path().join("pyproject.toml"),
            "[tool.uv]\ndev-dependencies = []\n",
        )
        .unwrap();
        assert!(detect(dir2.path(), ExecutionMode::Auto).is_package_manager_project);
    }

    #[test]
    fn editable_install_via_direct_url() {
        let dir = project();
        std::fs::write(dir.path().join("uv.lock"), "").unwrap();
        let venv = make_venv(dir.path(), ".venv");

        let site = venv.join("lib/python3.12/site-packages");
        let dist_info = site.join("mypkg-1.0.0.dist-info");
        std::fs::create_dir_all(&dist_info).unwrap();
        std::fs::write(
            dist_info.join("direct_url.json"),
            r#"{"url": "file:///src", "dir_info": {"editable": true}}"#,
        )
        .unwrap();

        let env = detect(dir.path(), ExecutionMode::Auto);
        if Platform::current().os.is_windows() {
            return; // fixture uses the unix site-packages layout
        }
        assert!(env.package_is_editable);
        // Editable beats the package-manager marker
        assert!(!env.use_runner_prefix);
    }

    #[rstest]
    #[case(ExecutionMode::UvRun, true)]
    #[case(ExecutionMode::Direct, false)]
    #[case(ExecutionMode::System, false)]
    fn explicit_modes_force_decision(#[case] mode: ExecutionMode, #[case] expected: bool) {
        let dir = project();
        std::fs::write(dir.path().join("uv.lock"), "").unwrap();
        make_venv(dir.path(), ".venv");

        let env = detect(dir.path(), mode);
        assert_eq!(env.use_runner_prefix, expected);
        if mode == ExecutionMode::System {
            assert!(env.venv_path.is_none());
        }
    }

    #[test]
    fn auto_decision_matrix() {
        // pm-project, not editable: runner prefix
        let dir = project();
        std::fs::write(dir.path().join("uv.lock"), "").unwrap();
        assert!(detect(dir.path(), ExecutionMode::Auto).use_runner_prefix);

        // plain project: direct
        let dir2 = project();
        assert!(!detect(dir2.path(), ExecutionMode::Auto).use_runner_prefix);
    }

    #[test]
    fn per_task_prefix_precedence() {
        let dir = project();
        let env = ExecutionEnvironment::detect(
            dir.path(),
            Some("mypkg"),
            ExecutionMode::Auto,
            Some("uv run".into()),
            None,
        );

        // Per-task prefix beats the env override
        assert_eq!(
            env.prepare_command("pytest", Some("hatch run")),
            "hatch run pytest"
        );
        // Empty per-task prefix beats the env override too
        assert_eq!(env.prepare_command("pytest", Some("")), "pytest");
    }

    #[test]
    fn prepare_environment_prepends_venv_bin() {
        let dir = project();
        let venv = make_venv(dir.path(), ".venv");
        let env = detect(dir.path(), ExecutionMode::Auto);

        let base = BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())]);
        let prepared = env.prepare_environment(&base);

        let path = &prepared["PATH"];
        let bin = venv.join(Platform::current().venv_bin_dir());
        assert!(path.starts_with(&bin.display().to_string()));
        assert!(path.ends_with("/usr/bin"));
    }

    #[test]
    fn runner_prefix_leaves_environment_alone() {
        let dir = project();
        std::fs::write(dir.path().join("uv.lock"), "").unwrap();
        make_venv(dir.path(), ".venv");
        let env = detect(dir.path(), ExecutionMode::Auto);
        assert!(env.use_runner_prefix);

        let base = BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())]);
        assert_eq!(env.prepare_environment(&base), base);
    }

    #[test]
    fn system_mode_never_mutates_path() {
        let dir = project();
        make_venv(dir.path(), ".venv");
        let env = detect(dir.path(), ExecutionMode::System);

        let base = BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())]);
        assert_eq!(env.prepare_environment(&base), base);
    }
}
