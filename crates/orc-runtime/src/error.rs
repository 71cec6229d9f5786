use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("container runtime connection failed: {0}")]
    ConnectionError(String),

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("container runtime API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
