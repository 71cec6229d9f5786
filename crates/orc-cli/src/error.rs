//! Thin error wrapper at the CLI boundary: everything downstream returns its
//! own domain error type, so this just needs to make them printable for the
//! operator and carry the process exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("deployment error: {0}")]
    Deploy(#[from] orc_deploy::error::DeployError),

    #[error("hypervisor error: {0}")]
    Hypervisor(#[from] orc_hypervisor::error::HypervisorError),

    #[error("compose error: {0}")]
    Compose(#[from] orc_compose::error::ComposeError),

    #[error("persistence error: {0}")]
    Persistence(#[from] orc_persistence::error::PersistenceError),

    #[error("validation error: {0}")]
    Validation(#[from] orc_types::error::CommonError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
