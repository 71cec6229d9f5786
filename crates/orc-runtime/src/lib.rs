//! Container-runtime adapter. Wraps the wire protocol (via `bollard`),
//! hiding connection pooling and response-shape polymorphism from callers.

pub mod containers;
pub mod error;
pub mod network;
pub mod pool;

pub use containers::{ContainerRuntime, LOG_TAIL_BYTE_CAP};
pub use error::{Result, RuntimeError};
pub use network::{NetworkBootstrap, MANAGED_NETWORK_LABEL};
pub use pool::{get_runtime_connection, PooledDocker, RuntimePool};
