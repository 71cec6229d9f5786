//! Injected persistence seams. Production wiring backs these with
//! `sqlx`-driven accessors over the control plane's database; the core
//! orchestrator crates depend only on these traits, so tests can stub
//! deterministic choices instead.

use crate::error::Result;
use async_trait::async_trait;
use orc_types::{AuditEntry, Deployment, DeploymentLocation, RoutingRule, SshKey};

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn get(&self, deployment_id: &str) -> Result<Deployment>;
    async fn upsert(&self, deployment: Deployment) -> Result<()>;
    async fn delete(&self, deployment_id: &str) -> Result<()>;
}

#[async_trait]
pub trait RoutingRepository: Send + Sync {
    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<RoutingRule>>;
    async fn insert(&self, rule: RoutingRule) -> Result<()>;
}

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<DeploymentLocation>>;
    async fn list_for_node(&self, deployment_id: &str, node_id: &str) -> Result<Vec<DeploymentLocation>>;
    async fn upsert(&self, location: DeploymentLocation) -> Result<()>;
    async fn delete(&self, location_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SshKeyRepository: Send + Sync {
    async fn list_for_scope(&self, organization_id: &str, vps_id: Option<&str>) -> Result<Vec<SshKey>>;
    async fn upsert(&self, key: SshKey) -> Result<()>;
    async fn delete(&self, key_id: &str) -> Result<()>;
    async fn find_by_fingerprint(
        &self,
        organization_id: &str,
        fingerprint: &str,
        vps_id: Option<&str>,
    ) -> Result<Option<SshKey>>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Best-effort by contract: callers must not fail an operation solely
    /// because the audit write failed.
    async fn append(&self, entry: AuditEntry) -> Result<()>;
}
