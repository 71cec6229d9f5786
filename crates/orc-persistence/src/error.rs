use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
