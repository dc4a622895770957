//! Task registry
//!
//! Parses the manifest's `[tasks]` tree into task definitions and resolves
//! task names with hierarchical fallback: exact match, then the
//! namespace's `_default`, then parent and grandparent matches with the
//! unmatched segments passed through as arguments.

use crate::error::{Error, Result};
use crate::executor::TaskExecutor;
use crate::schema::{
    ExecutionMode, ExportedTask, ProcessTitleFormat, TaskConfig, TaskNamespace, TaskResult,
    TaskRun, MAX_DEPTH,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use wrk_config::{WrkConfig, MANIFEST_FILE};

/// Task registry for one repository
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    pub repo_path: PathBuf,
    pub tasks: BTreeMap<String, TaskConfig>,
    pub package_name: Option<String>,
    pub execution_mode: ExecutionMode,
    pub auto_detect_env: bool,
}

impl TaskRegistry {
    /// Load tasks from the repository's `wrk.toml`
    ///
    /// A repository without a manifest gets an empty registry.
    pub fn from_repo(repo_path: &Path) -> Result<Self> {
        let manifest = repo_path.join(MANIFEST_FILE);
        let Ok(text) = std::fs::read_to_string(&manifest) else {
            return Ok(Self {
                repo_path: repo_path.to_path_buf(),
                tasks: BTreeMap::new(),
                package_name: None,
                execution_mode: ExecutionMode::default(),
                auto_detect_env: true,
            });
        };

        let table: toml::Table = text.parse().map_err(Error::Parse)?;

        let mut tasks = BTreeMap::new();
        if let Some(toml::Value::Table(tasks_table)) = table.get("tasks") {
            parse_tasks_recursive(tasks_table, &mut tasks, None, 1)?;
        }

        let exported: Vec<String> = table
            .get("export")
            .and_then(|e| e.get("tasks"))
            .and_then(|t| t.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        for name in exported {
            if let Some(task) = tasks.get_mut(&name) {
                task.is_exported = true;
            }
        }

        let package_name = table
            .get("project_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let auto_detect_env = table
            .get("task_auto_detect")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        debug!(
            repo = %repo_path.display(),
            tasks = tasks.len(),
            "Loaded task registry"
        );

        Ok(Self {
            repo_path: repo_path.to_path_buf(),
            tasks,
            package_name,
            execution_mode: ExecutionMode::default(),
            auto_detect_env,
        })
    }

    /// Build a registry from an already-parsed configuration
    pub fn from_config(config: &WrkConfig, repo_path: &Path) -> Result<Self> {
        let mut tasks = BTreeMap::new();
        parse_tasks_recursive(&config.tasks, &mut tasks, None, 1)?;

        if let Some(export) = &config.export {
            for name in &export.tasks {
                if let Some(task) = tasks.get_mut(name) {
                    task.is_exported = true;
                }
            }
        }

        Ok(Self {
            repo_path: repo_path.to_path_buf(),
            tasks,
            package_name: (!config.project_name.is_empty()).then(|| config.project_name.clone()),
            execution_mode: ExecutionMode::default(),
            auto_detect_env: config.task_auto_detect,
        })
    }

    /// Look up a task by full name
    pub fn get_task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.get(name)
    }

    /// All registered tasks
    pub fn list_tasks(&self) -> Vec<&TaskConfig> {
        self.tasks.values().collect()
    }

    /// Tasks the manifest exports
    pub fn exported_tasks(&self) -> Vec<ExportedTask> {
        self.tasks
            .values()
            .filter(|t| t.is_exported)
            .map(|t| ExportedTask {
                task: t.clone(),
                description: t.description.clone(),
                requires: t.requires.clone(),
            })
            .collect()
    }

    /// Resolve a task name with hierarchical fallback
    ///
    /// Priority: exact match; the name's `_default`; parent match or
    /// parent `_default` with the leaf as an argument; grandparent match
    /// with the two trailing segments as arguments.
    pub fn resolve(&self, name: &str, args: &[String]) -> Result<(&TaskConfig, Vec<String>)> {
        let ns = TaskNamespace::parse(name)?;
        let full_name = ns.full_name();

        // Priority 1: exact match
        if let Some(task) = self.tasks.get(&full_name) {
            return Ok((task, args.to_vec()));
        }

        // Priority 2: the namespace's own _default
        if let Some(task) = self.tasks.get(&format!("{}._default", full_name)) {
            return Ok((task, args.to_vec()));
        }

        // Priority 3: parent (or parent _default) + leaf as argument
        if ns.depth() >= 2 {
            if let Some(parent) = ns.parent() {
                let mut new_args = vec![ns.name().to_string()];
                new_args.extend_from_slice(args);

                if let Some(task) = self.tasks.get(&parent.full_name()) {
                    return Ok((task, new_args));
                }
                if let Some(task) = self.tasks.get(&format!("{}._default", parent.full_name())) {
                    return Ok((task, new_args));
                }
            }
        }

        // Priority 4: grandparent + two trailing segments as arguments
        if ns.depth() >= 3 {
            if let Some(parent) = ns.parent() {
                if let Some(grandparent) = parent.parent() {
                    if let Some(task) = self.tasks.get(&grandparent.full_name()) {
                        let mut new_args =
                            vec![parent.name().to_string(), ns.name().to_string()];
                        new_args.extend_from_slice(args);
                        return Ok((task, new_args));
                    }
                }
            }
        }

        Err(Error::task_not_found(
            name,
            self.tasks.keys().cloned().collect(),
        ))
    }

    /// Run a task by name with smart resolution
    ///
    /// Returns a boxed future: composite tasks recurse back into
    /// `run_task` for their subtasks, and the indirection keeps the
    /// recursion well-founded.
    pub fn run_task<'a>(
        &'a self,
        name: &'a str,
        args: &'a [String],
        dry_run: bool,
        env: Option<&'a BTreeMap<String, String>>,
    ) -> Pin<Box<dyn Future<Output = Result<TaskResult>> + Send + 'a>> {
        Box::pin(async move {
            let (task, resolved_args) = self.resolve(name, args)?;
            let task = task.clone();

            if task.is_composite() {
                return self.run_composite(task, dry_run, env).await;
            }

            let executor = TaskExecutor::new(&self.repo_path)
                .with_env(env.cloned().unwrap_or_default())
                .with_package_name(self.package_name.clone())
                .with_execution_mode(self.execution_mode)
                .with_auto_detect(self.auto_detect_env);
            executor.execute(&task, &resolved_args, dry_run).await
        })
    }

    /// Run a composite task
    ///
    /// Sequential composites stop on the first failure; parallel
    /// composites run every subtask to completion and aggregate, with the
    /// failed subtasks' stderr concatenated in declaration order.
    async fn run_composite(
        &self,
        task: TaskConfig,
        dry_run: bool,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<TaskResult> {
        let TaskRun::Composite(subtasks) = &task.run else {
            unreachable!("run_composite called on a command task");
        };
        let start = Instant::now();

        if task.parallel {
            info!(
                task = %task.full_name(),
                subtasks = subtasks.len(),
                "Running composite task in parallel"
            );

            let no_args: &[String] = &[];
            let futures = subtasks.iter().map(|name| {
                let name = name.clone();
                async move {
                    match self.run_task(&name, no_args, dry_run, env).await {
                        Ok(result) => result,
                        Err(e) => {
                            // One subtask failing to even start must not
                            // cancel its siblings
                            error!(subtask = %name, error = %e, "Exception in parallel subtask");
                            TaskResult {
                                task: TaskConfig::command(name, format!("# Error: {}", e)),
                                success: false,
                                exit_code: -1,
                                stdout: String::new(),
                                stderr: e.to_string(),
                                duration: 0.0,
                            }
                        }
                    }
                }
            });
            let results = futures_util::future::join_all(futures).await;

            let success = results.iter().all(|r| r.success);
            let failed: Vec<&TaskResult> = results.iter().filter(|r| !r.success).collect();

            let stderr = if failed.is_empty() {
                String::new()
            } else {
                let mut parts = vec![format!(
                    "Parallel task '{}' had {} failure(s): {}\n",
                    task.full_name(),
                    failed.len(),
                    failed
                        .iter()
                        .map(|r| r.task.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )];
                // Declaration order keeps the aggregate deterministic
                for result in &results {
                    if !result.success && !result.stderr.is_empty() {
                        parts.push(format!(
                            "\n--- {} stderr ---\n{}",
                            result.task.name, result.stderr
                        ));
                    }
                }
                parts.concat()
            };

            let duration = start.elapsed().as_secs_f64();
            info!(
                task = %task.full_name(),
                success = success,
                succeeded = results.iter().filter(|r| r.success).count(),
                failed = failed.len(),
                "Parallel composite task completed"
            );

            return Ok(TaskResult {
                task: task.clone(),
                success,
                exit_code: if success { 0 } else { 1 },
                stdout: String::new(),
                stderr,
                duration,
            });
        }

        // Sequential: declaration order, stop on first failure
        let no_args: &[String] = &[];
        let mut all_success = true;
        for name in subtasks {
            let result = self.run_task(name, no_args, dry_run, env).await?;
            if !result.success {
                warn!(
                    task = %task.full_name(),
                    subtask = %name,
                    "Subtask failed, stopping composite"
                );
                all_success = false;
                break;
            }
        }

        Ok(TaskResult {
            task: task.clone(),
            success: all_success,
            exit_code: if all_success { 0 } else { 1 },
            stdout: String::new(),
            stderr: String::new(),
            duration: start.elapsed().as_secs_f64(),
        })
    }
}

/// Recursively parse a `[tasks]` table
///
/// A table without a `run` key is a namespace; anything else is a task.
fn parse_tasks_recursive(
    table: &toml::Table,
    output: &mut BTreeMap<String, TaskConfig>,
    namespace: Option<&str>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::NamespaceTooDeep {
            name: namespace.unwrap_or("tasks").to_string(),
            max: MAX_DEPTH,
        });
    }

    for (name, value) in table {
        let full_name = match namespace {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.clone(),
        };

        match value {
            toml::Value::Table(nested) if !nested.contains_key("run") => {
                parse_tasks_recursive(nested, output, Some(&full_name), depth + 1)?;
            }
            _ => {
                if let Some(task) = parse_task(name, value, namespace) {
                    output.insert(full_name, task);
                }
            }
        }
    }
    Ok(())
}

/// Parse one task definition: bare command, composite list, or full table
fn parse_task(name: &str, value: &toml::Value, namespace: Option<&str>) -> Option<TaskConfig> {
    let mut task = match value {
        toml::Value::String(command) => TaskConfig::command(name, command.clone()),
        toml::Value::Array(items) => {
            let subtasks: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
            let mut task = TaskConfig::command(name, "");
            task.run = TaskRun::Composite(subtasks);
            task
        }
        toml::Value::Table(table) => {
            let run = match table.get("run")? {
                toml::Value::String(command) => TaskRun::Command(command.clone()),
                toml::Value::Array(items) => TaskRun::Composite(
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(|s| s.to_string()))
                        .collect(),
                ),
                _ => return None,
            };

            let mut task = TaskConfig::command(name, "");
            task.run = run;
            task.description = table
                .get("description")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            if let Some(toml::Value::Table(env)) = table.get("env") {
                task.env = env
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();
            }
            task.depends_on = string_list(table.get("depends_on"));
            task.working_dir = table
                .get("working_dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from);
            task.requires = string_list(table.get("requires"));
            task.timeout = table.get("timeout").and_then(toml_number);
            task.stream_output = table
                .get("stream_output")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            task.process_title_format = match table
                .get("process_title_format")
                .and_then(|v| v.as_str())
            {
                Some("leaf") => ProcessTitleFormat::Leaf,
                Some("abbreviated") => ProcessTitleFormat::Abbreviated,
                _ => ProcessTitleFormat::Full,
            };
            task.command_prefix = table
                .get("command_prefix")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            task.execution_mode = match table.get("execution_mode").and_then(|v| v.as_str()) {
                Some("uv_run") => ExecutionMode::UvRun,
                Some("direct") => ExecutionMode::Direct,
                Some("system") => ExecutionMode::System,
                _ => ExecutionMode::Auto,
            };
            task.parallel = table
                .get("parallel")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            task
        }
        _ => return None,
    };

    task.namespace = namespace.map(|s| s.to_string());
    Some(task)
}

fn string_list(value: Option<&toml::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn toml_number(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(n) => Some(*n as f64),
        toml::Value::Float(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_from(tasks: toml::Table) -> TaskRegistry {
        let dir = tempfile::tempdir().unwrap();
        let config = WrkConfig {
            project_name: "demo".into(),
            tasks,
            ..Default::default()
        };
        TaskRegistry::from_config(&config, dir.path()).unwrap()
    }

    #[test]
    fn parses_all_three_forms() {
        let registry = registry_from(toml::toml! {
            lint = "ruff check ."
            ci = ["lint", "test"]

            [test]
            run = "pytest"
            timeout = 120
            stream_output = true
            parallel = false

            [test.unit]
            run = "pytest tests/unit"
        });

        assert_eq!(
            registry.get_task("lint").unwrap().run,
            TaskRun::Command("ruff check .".into())
        );
        assert!(registry.get_task("ci").unwrap().is_composite());

        let test = registry.get_task("test").unwrap();
        assert_eq!(test.timeout, Some(120.0));
        assert!(test.stream_output);

        let unit = registry.get_task("test.unit").unwrap();
        assert_eq!(unit.full_name(), "test.unit");
        assert_eq!(unit.namespace.as_deref(), Some("test"));
    }

    #[test]
    fn nesting_limit_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let config = WrkConfig {
            project_name: "demo".into(),
            tasks: toml::toml! {
                [a.b.c.d]
                run = "too deep"
            },
            ..Default::default()
        };
        assert!(TaskRegistry::from_config(&config, dir.path()).is_err());
    }

    #[test]
    fn resolve_exact_default_and_parent_fallback() {
        let registry = registry_from(toml::toml! {
            [test.unit]
            fast = "pytest -k fast"
            _default = "pytest"
        });

        // Exact match
        let (task, args) = registry.resolve("test.unit.fast", &[]).unwrap();
        assert_eq!(task.full_name(), "test.unit.fast");
        assert!(args.is_empty());

        // _default of the named namespace
        let (task, args) = registry.resolve("test.unit", &[]).unwrap();
        assert_eq!(task.full_name(), "test.unit._default");
        assert!(args.is_empty());

        // Missing leaf falls back to the parent _default with the leaf as
        // an argument
        let (task, args) = registry.resolve("test.unit.slow", &[]).unwrap();
        assert_eq!(task.full_name(), "test.unit._default");
        assert_eq!(args, vec!["slow"]);
    }

    #[test]
    fn resolve_parent_and_grandparent_matches() {
        let registry = registry_from(toml::toml! {
            test = "pytest"
        });

        let (task, args) = registry.resolve("test.unit", &["-v".to_string()]).unwrap();
        assert_eq!(task.full_name(), "test");
        assert_eq!(args, vec!["unit", "-v"]);

        let (task, args) = registry.resolve("test.unit.fast", &[]).unwrap();
        assert_eq!(task.full_name(), "test");
        assert_eq!(args, vec!["unit", "fast"]);
    }

    #[test]
    fn colon_names_resolve() {
        let registry = registry_from(toml::toml! {
            [test]
            unit = "pytest tests/unit"
        });
        let (task, _) = registry.resolve("test:unit", &[]).unwrap();
        assert_eq!(task.full_name(), "test.unit");
    }

    #[test]
    fn unresolvable_name_reports_available() {
        let registry = registry_from(toml::toml! {
            lint = "ruff check ."
        });
        let err = registry.resolve("missing", &[]).unwrap_err();
        match err {
            Error::TaskNotFound { name, available } => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["lint"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exports_marked() {
        let dir = tempfile::tempdir().unwrap();
        let config = WrkConfig {
            project_name: "demo".into(),
            tasks: toml::toml! {
                lint = "ruff check ."
                [test]
                run = "pytest"
            },
            export: Some(wrk_config::ExportSection {
                tasks: vec!["test".into()],
            }),
            ..Default::default()
        };
        let registry = TaskRegistry::from_config(&config, dir.path()).unwrap();

        let exported = registry.exported_tasks();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].task.full_name(), "test");
        assert!(!registry.get_task("lint").unwrap().is_exported);
    }

    #[test]
    fn from_repo_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"
project_name = "demo"

[tasks]
lint = "ruff check ."

[export]
tasks = ["lint"]
"#,
        )
        .unwrap();

        let registry = TaskRegistry::from_repo(dir.path()).unwrap();
        assert_eq!(registry.package_name.as_deref(), Some("demo"));
        assert!(registry.get_task("lint").unwrap().is_exported);
    }

    #[test]
    fn missing_manifest_gives_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::from_repo(dir.path()).unwrap();
        assert!(registry.tasks.is_empty());
    }
}
