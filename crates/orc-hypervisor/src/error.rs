//! Error types for the hypervisor HTTP client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HypervisorError>;

#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("request to {endpoint} failed: {message}")]
    RequestFailed { endpoint: String, message: String },

    #[error("unexpected response shape from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },

    #[error("no storage pool named '{0}' on node '{1}'")]
    StorageNotFound(String, String),

    #[error("no free VM id found at or above start id {0}")]
    IdRangeExhausted(u32),

    #[error("refusing to delete VM {vmid}: hypervisor reports name '{actual}', expected '{expected}'")]
    DeleteGuardRefused { vmid: u32, expected: String, actual: String },

    #[error("VM {0} did not reach status '{1}' within the timeout")]
    StatusTimeout(u32, String),

    #[error("template '{0}' has no recognized boot disk")]
    NoBootDisk(String),

    #[error("ssh key sync left {0} fingerprint(s) on the hypervisor not present in the database")]
    SshKeySyncIncomplete(usize),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] orc_persistence::PersistenceError),
}
