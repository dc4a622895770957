//! Error types for wrk-config

/// Result type alias for wrk-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for manifest loading and validation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manifest could not be parsed
    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// Manifest parsed but failed validation
    #[error("Invalid configuration: {field}: {message}")]
    Validation { field: String, message: String },
}

impl Error {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Parse(Box::new(e))
    }
}
