//! DashMap-backed in-memory persistence, used by tests and by `orc-cli`
//! when run without a database.

use crate::error::{PersistenceError, Result};
use crate::traits::{AuditRepository, DeploymentRepository, LocationRepository, RoutingRepository, SshKeyRepository};
use async_trait::async_trait;
use dashmap::DashMap;
use orc_types::{AuditEntry, Deployment, DeploymentLocation, RoutingRule, SshKey};

#[derive(Default)]
pub struct InMemoryGateway {
    deployments: DashMap<String, Deployment>,
    routing: DashMap<String, Vec<RoutingRule>>,
    locations: DashMap<String, DeploymentLocation>,
    ssh_keys: DashMap<String, SshKey>,
    audit: DashMap<String, AuditEntry>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryGateway {
    async fn get(&self, deployment_id: &str) -> Result<Deployment> {
        self.deployments
            .get(deployment_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PersistenceError::NotFound(deployment_id.to_string()))
    }

    async fn upsert(&self, deployment: Deployment) -> Result<()> {
        self.deployments.insert(deployment.deployment_id.clone(), deployment);
        Ok(())
    }

    async fn delete(&self, deployment_id: &str) -> Result<()> {
        self.deployments.remove(deployment_id);
        Ok(())
    }
}

#[async_trait]
impl RoutingRepository for InMemoryGateway {
    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<RoutingRule>> {
        Ok(self.routing.get(deployment_id).map(|entry| entry.value().clone()).unwrap_or_default())
    }

    async fn insert(&self, rule: RoutingRule) -> Result<()> {
        self.routing.entry(rule.deployment_id.clone()).or_default().push(rule);
        Ok(())
    }
}

#[async_trait]
impl LocationRepository for InMemoryGateway {
    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<DeploymentLocation>> {
        Ok(self
            .locations
            .iter()
            .filter(|entry| entry.value().deployment_id == deployment_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_for_node(&self, deployment_id: &str, node_id: &str) -> Result<Vec<DeploymentLocation>> {
        Ok(self
            .locations
            .iter()
            .filter(|entry| entry.value().deployment_id == deployment_id && entry.value().node_id == node_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert(&self, location: DeploymentLocation) -> Result<()> {
        self.locations.insert(location.location_id.clone(), location);
        Ok(())
    }

    async fn delete(&self, location_id: &str) -> Result<()> {
        self.locations.remove(location_id);
        Ok(())
    }
}

#[async_trait]
impl SshKeyRepository for InMemoryGateway {
    async fn list_for_scope(&self, organization_id: &str, vps_id: Option<&str>) -> Result<Vec<SshKey>> {
        Ok(self
            .ssh_keys
            .iter()
            .filter(|entry| {
                let key = entry.value();
                key.organization_id == organization_id && key.vps_id.as_deref() == vps_id
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert(&self, key: SshKey) -> Result<()> {
        self.ssh_keys.insert(key.key_id.clone(), key);
        Ok(())
    }

    async fn delete(&self, key_id: &str) -> Result<()> {
        self.ssh_keys.remove(key_id);
        Ok(())
    }

    async fn find_by_fingerprint(
        &self,
        organization_id: &str,
        fingerprint: &str,
        vps_id: Option<&str>,
    ) -> Result<Option<SshKey>> {
        Ok(self
            .ssh_keys
            .iter()
            .map(|entry| entry.value().clone())
            .find(|key| key.organization_id == organization_id && key.fingerprint == fingerprint && key.vps_id.as_deref() == vps_id))
    }
}

#[async_trait]
impl AuditRepository for InMemoryGateway {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.audit.insert(entry.id.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_types::{ImageSelector, Vps, VpsFlavor};

    #[tokio::test]
    async fn deployment_round_trip() {
        let gateway = InMemoryGateway::new();
        let deployment = Deployment::new(
            "d1",
            orc_types::WorkloadSource::Image("alpine:3.20".into()),
            "d1.example",
        )
        .unwrap();
        gateway.upsert(deployment.clone()).await.unwrap();
        let fetched = gateway.get("d1").await.unwrap();
        assert_eq!(fetched.deployment_id, deployment.deployment_id);
    }

    #[tokio::test]
    async fn missing_deployment_is_not_found() {
        let gateway = InMemoryGateway::new();
        assert!(gateway.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn ssh_key_scope_filtering_distinguishes_org_wide_from_vps_scoped() {
        let gateway = InMemoryGateway::new();
        let org_wide = SshKey {
            key_id: "k1".into(),
            organization_id: "org1".into(),
            vps_id: None,
            name: "laptop".into(),
            public_key: "ssh-ed25519 AAAA".into(),
            fingerprint: "fp1".into(),
        };
        let vps_scoped = SshKey {
            key_id: "k2".into(),
            organization_id: "org1".into(),
            vps_id: Some("vps1".into()),
            name: "deploy-key".into(),
            public_key: "ssh-ed25519 BBBB".into(),
            fingerprint: "fp2".into(),
        };
        gateway.upsert(org_wide).await.unwrap();
        gateway.upsert(vps_scoped).await.unwrap();

        let org_scope = gateway.list_for_scope("org1", None).await.unwrap();
        assert_eq!(org_scope.len(), 1);
        assert_eq!(org_scope[0].key_id, "k1");

        let vps_scope = gateway.list_for_scope("org1", Some("vps1")).await.unwrap();
        assert_eq!(vps_scope.len(), 1);
        assert_eq!(vps_scope[0].key_id, "k2");
    }

    #[test]
    fn vps_flavor_constructs() {
        let vps = Vps::new(
            "vps1",
            "my-vm",
            "org1",
            VpsFlavor { cpu_cores: 2, memory_bytes: 2 << 30, disk_bytes: 20 << 30 },
            ImageSelector::Ubuntu2404,
        );
        assert!(vps.is_ok());
    }
}
