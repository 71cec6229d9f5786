//! The Deployment Manager: lifecycle operations for single-image and
//! compose container workloads — create/start/stop/delete/restart/scale,
//! plus the compose-specific deploy/stop/remove and tail-log retrieval.

pub mod config;
pub mod container_spec;
pub mod default_routing;
pub mod error;
pub mod forwarder;
pub mod manager;
pub mod metrics;
pub mod port_resolution;
pub mod scratch;
pub mod selector;
pub mod state;

pub use config::DeployConfig;
pub use error::{DeployError, Result};
pub use forwarder::{NodeForwarder, NoopForwarder};
pub use manager::DeploymentManager;
pub use metrics::{DeployMetrics, NoopMetrics, PrometheusMetrics};
pub use selector::{LocalNodeSelector, NodeSelector, SelectedNode};
pub use state::{LocationEvent, LocationState};
