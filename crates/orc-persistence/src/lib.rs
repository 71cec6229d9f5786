//! Typed accessors over the orchestrator's relational tables.
//!
//! The tables themselves (deployment, routing, location, ssh-key, audit) are
//! out of scope for this crate — per the system spec they are owned by the
//! API layer's database. What lives here are the trait seams the
//! Deployment Manager and Hypervisor Client are coded against, plus an
//! in-memory implementation (`memory::InMemoryGateway`) used by tests and by
//! standalone/demo runs of `orc-cli`.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{PersistenceError, Result};
pub use memory::InMemoryGateway;
pub use traits::{AuditRepository, DeploymentRepository, LocationRepository, RoutingRepository, SshKeyRepository};
