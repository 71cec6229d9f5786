//! Deployment Manager error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("illegal state transition: {event} from {state}")]
    IllegalTransition { state: String, event: String },

    #[error("no writable scratch directory found for deployment {0}")]
    NoScratchDirectory(String),

    #[error("scale-up is not implemented")]
    ScaleUpNotImplemented,

    #[error("deployment {0} has no local container to read logs from")]
    NoLocalContainer(String),

    #[error("runtime error: {0}")]
    Runtime(#[from] orc_runtime::RuntimeError),

    #[error("compose error: {0}")]
    Compose(#[from] orc_compose::ComposeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] orc_persistence::PersistenceError),

    #[error("validation error: {0}")]
    Validation(#[from] orc_types::CommonError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
