//! wrk task layer
//!
//! Three cooperating pieces: the [`ExecutionEnvironment`] probe decides how
//! commands reach the project (package-manager runner vs direct PATH), the
//! [`TaskRegistry`] parses and resolves the manifest's task tree, and the
//! [`TaskExecutor`] runs leaf tasks with streaming or buffered output.

mod environment;
mod error;
mod executor;
mod registry;
mod schema;

pub use environment::{ExecutionEnvironment, RUNNER_PREFIX, TASK_RUNNER_ENV};
pub use error::{Error, Result};
pub use executor::{format_task_title, TaskExecutor, DEFAULT_TIMEOUT, TASK_TITLE_ENV};
pub use registry::TaskRegistry;
pub use schema::{
    ExecutionMode, ExportedTask, PackageTaskReference, ProcessTitleFormat, TaskConfig,
    TaskNamespace, TaskResult, TaskRun, MAX_DEPTH,
};
