//! Errors for telemetry initialization.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("invalid log filter directive: {0}")]
    InvalidFilter(String),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}
