//! Error types for compose rewriting and apply-tool invocation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ComposeError>;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("compose document is not a mapping at its root")]
    NotAMapping,

    #[error("service '{0}' is not a mapping")]
    ServiceNotAMapping(String),

    #[error("apply command failed: {command} - {stderr}")]
    ApplyFailed { command: String, stderr: String },

    #[error("file operation failed: {operation} - {path}")]
    FileOperationFailed { operation: String, path: String },

    #[error("no running container discovered after apply for deployment {0}")]
    NoContainersRegistered(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ComposeError {
    pub fn apply_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ApplyFailed { command: command.into(), stderr: stderr.into() }
    }

    pub fn file_operation_failed(operation: impl Into<String>, path: impl Into<String>) -> Self {
        Self::FileOperationFailed { operation: operation.into(), path: path.into() }
    }
}
