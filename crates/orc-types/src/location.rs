//! `DeploymentLocation` — binds a (deployment, node, container) triple.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLocation {
    pub location_id: String,
    pub deployment_id: String,
    pub node_id: String,
    pub node_hostname: String,
    /// May be a synthetic placeholder for cluster-service workloads whose
    /// container is not yet materialized.
    pub container_id: String,
    pub status: LocationStatus,
    pub port: Option<u16>,
    pub domain: String,
    pub health_status: HealthState,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Sentinel container id for cluster-service workloads whose container has
/// not yet been materialized (see orc-deploy's cluster-mode registration).
pub const SYNTHETIC_CONTAINER_PLACEHOLDER: &str = "pending-materialization";

impl DeploymentLocation {
    pub fn is_orphaned(&self, container_exists: bool) -> bool {
        !container_exists && self.container_id != SYNTHETIC_CONTAINER_PLACEHOLDER
    }
}
