//! Task data model
//!
//! Hierarchical task names (`test.unit.fast`), task definitions as parsed
//! from the manifest's `[tasks]` tree, cross-package task references, and
//! execution results.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Maximum task namespace depth
pub const MAX_DEPTH: usize = 3;

/// Hierarchical task namespace (e.g. `test.unit.fast`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNamespace {
    parts: Vec<String>,
}

impl TaskNamespace {
    /// Parse a task name into namespace components
    ///
    /// Both `test.unit` and `test:unit` spellings are accepted; colons
    /// normalize to dots.
    pub fn parse(name: &str) -> Result<Self> {
        let normalized = name.replace(':', ".");
        let parts: Vec<String> = normalized.split('.').map(|s| s.to_string()).collect();
        if parts.len() > MAX_DEPTH {
            return Err(Error::NamespaceTooDeep {
                name: name.to_string(),
                max: MAX_DEPTH,
            });
        }
        Ok(Self { parts })
    }

    /// The full dotted name
    pub fn full_name(&self) -> String {
        self.parts.join(".")
    }

    /// All but the last part, or `None` for flat names
    pub fn namespace(&self) -> Option<String> {
        if self.parts.len() <= 1 {
            None
        } else {
            Some(self.parts[..self.parts.len() - 1].join("."))
        }
    }

    /// The last part
    pub fn name(&self) -> &str {
        self.parts.last().map(|s| s.as_str()).unwrap_or("")
    }

    /// Nesting depth: 1 = flat
    pub fn depth(&self) -> usize {
        self.parts.len()
    }

    /// The parent namespace, or `None` for flat names
    pub fn parent(&self) -> Option<TaskNamespace> {
        if self.parts.len() <= 1 {
            None
        } else {
            Some(Self {
                parts: self.parts[..self.parts.len() - 1].to_vec(),
            })
        }
    }
}

/// Reference to a task exported by another package (`@package.task`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTaskReference {
    pub package: String,
    pub task_name: String,
}

impl PackageTaskReference {
    /// Whether a name is a package reference
    pub fn is_package_reference(name: &str) -> bool {
        name.starts_with('@')
    }

    /// Parse an `@package.task` reference
    pub fn parse(reference: &str) -> Result<Self> {
        let Some(rest) = reference.strip_prefix('@') else {
            return Err(Error::InvalidPackageReference {
                reference: reference.to_string(),
                reason: "must start with @".into(),
            });
        };
        let Some((package, task_name)) = rest.split_once('.') else {
            return Err(Error::InvalidPackageReference {
                reference: reference.to_string(),
                reason: "must include a task name".into(),
            });
        };
        Ok(Self {
            package: package.to_string(),
            task_name: task_name.to_string(),
        })
    }

    /// The full `@package.task` spelling
    pub fn full_reference(&self) -> String {
        format!("@{}.{}", self.package, self.task_name)
    }
}

/// How a task's process title is formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessTitleFormat {
    /// Complete namespaced name: `test.unit.coverage`
    #[default]
    Full,
    /// Last segment only: `coverage`
    Leaf,
    /// First and last segment: `test...coverage`
    Abbreviated,
}

/// Execution mode for a task or executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Detect runner prefix vs direct PATH from the project
    #[default]
    Auto,
    /// Always invoke through the package-manager runner
    UvRun,
    /// Always run directly with PATH modification
    Direct,
    /// Run directly with no environment modification at all
    System,
}

/// A task's `run` value: one command, or a list of other tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRun {
    /// Shell command string
    Command(String),
    /// Composite task: names of tasks to run
    Composite(Vec<String>),
}

/// Configuration for a single task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    pub name: String,
    pub run: TaskRun,
    pub description: Option<String>,
    pub env: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Parent namespace (`test` for `test.unit`)
    pub namespace: Option<String>,
    /// Whether the manifest exports this task to other packages
    pub is_exported: bool,
    /// Source package when imported through an `@package.task` reference
    pub package: Option<String>,
    /// Tool ids this task needs installed
    pub requires: Vec<String>,
    /// Timeout in seconds; the executor default applies when absent
    pub timeout: Option<f64>,
    pub stream_output: bool,
    pub process_title_format: ProcessTitleFormat,
    /// Per-task command prefix; `Some("")` means "explicitly none"
    pub command_prefix: Option<String>,
    pub execution_mode: ExecutionMode,
    /// Run composite subtasks concurrently
    pub parallel: bool,
}

impl TaskConfig {
    /// Create a minimal command task
    pub fn command(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: TaskRun::Command(run.into()),
            description: None,
            env: BTreeMap::new(),
            depends_on: Vec::new(),
            working_dir: None,
            namespace: None,
            is_exported: false,
            package: None,
            requires: Vec::new(),
            timeout: None,
            stream_output: false,
            process_title_format: ProcessTitleFormat::default(),
            command_prefix: None,
            execution_mode: ExecutionMode::default(),
            parallel: false,
        }
    }

    /// Whether this task runs other tasks
    pub fn is_composite(&self) -> bool {
        matches!(self.run, TaskRun::Composite(_))
    }

    /// Whether this is a namespace default task
    pub fn is_default(&self) -> bool {
        self.name == "_default"
    }

    /// The full namespaced name
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}.{}", namespace, self.name),
            None => self.name.clone(),
        }
    }

    /// Nesting depth of the full name
    pub fn depth(&self) -> usize {
        match &self.namespace {
            Some(namespace) => namespace.split('.').count() + 1,
            None => 1,
        }
    }
}

/// Metadata for an exported task
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTask {
    pub task: TaskConfig,
    pub description: Option<String>,
    pub requires: Vec<String>,
}

/// Result of executing one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub task: TaskConfig,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in seconds
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_parsing() {
        let ns = TaskNamespace::parse("test.unit.fast").unwrap();
        assert_eq!(ns.full_name(), "test.unit.fast");
        assert_eq!(ns.namespace().as_deref(), Some("test.unit"));
        assert_eq!(ns.name(), "fast");
        assert_eq!(ns.depth(), 3);
        assert_eq!(ns.parent().unwrap().full_name(), "test.unit");
    }

    #[test]
    fn colon_syntax_normalizes() {
        let ns = TaskNamespace::parse("test:unit").unwrap();
        assert_eq!(ns.full_name(), "test.unit");
    }

    #[test]
    fn depth_limit() {
        assert!(TaskNamespace::parse("a.b.c.d").is_err());
    }

    #[test]
    fn package_references() {
        let reference = PackageTaskReference::parse("@mypkg.test.unit").unwrap();
        assert_eq!(reference.package, "mypkg");
        assert_eq!(reference.task_name, "test.unit");
        assert_eq!(reference.full_reference(), "@mypkg.test.unit");

        assert!(PackageTaskReference::parse("mypkg.test").is_err());
        assert!(PackageTaskReference::parse("@mypkg").is_err());
        assert!(PackageTaskReference::is_package_reference("@x.y"));
        assert!(!PackageTaskReference::is_package_reference("x.y"));
    }

    #[test]
    fn full_name_and_depth() {
        let mut task = TaskConfig::command("unit", "pytest");
        assert_eq!(task.full_name(), "unit");
        assert_eq!(task.depth(), 1);

        task.namespace = Some("test".into());
        assert_eq!(task.full_name(), "test.unit");
        assert_eq!(task.depth(), 2);
    }

    #[test]
    fn composite_detection() {
        let command = TaskConfig::command("x", "echo");
        assert!(!command.is_composite());

        let mut composite = TaskConfig::command("ci", "");
        composite.run = TaskRun::Composite(vec!["lint".into(), "test".into()]);
        assert!(composite.is_composite());
    }
}
