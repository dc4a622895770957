//! Error types for wrk-tasks

/// Result type alias for wrk-tasks operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the task layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Task name resolved to nothing
    #[error("Task not found: {name}")]
    TaskNotFound { name: String, available: Vec<String> },

    /// Task exceeded its timeout and was killed
    #[error("Task '{task}' timed out after {timeout_secs}s")]
    TaskTimeout { task: String, timeout_secs: u64 },

    /// Task name nests deeper than the registry allows
    #[error("Task nesting too deep: {name} (max {max} levels)")]
    NamespaceTooDeep { name: String, max: usize },

    /// `@package.task` reference is malformed
    #[error("Invalid package task reference: {reference}: {reason}")]
    InvalidPackageReference { reference: String, reason: String },

    /// Manifest task table could not be parsed
    #[error("Failed to parse tasks: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Error {
    /// Create a task-not-found error
    pub fn task_not_found(name: impl Into<String>, available: Vec<String>) -> Self {
        Self::TaskNotFound {
            name: name.into(),
            available,
        }
    }

    /// Process exit code a command-line caller should report
    ///
    /// Timeouts map to 124 (the `timeout(1)` convention); everything else
    /// is a plain failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TaskTimeout { .. } => 124,
            _ => 1,
        }
    }
}
