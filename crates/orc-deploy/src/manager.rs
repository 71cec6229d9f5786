//! The Deployment Manager: the container lifecycle for both single-image
//! and compose workloads. Owns reconciliation with the container runtime,
//! registration of `DeploymentLocation` rows, and default-route insertion.

use crate::config::DeployConfig;
use crate::container_spec::{derive_config, ContainerSpecInput};
use crate::default_routing;
use crate::error::{DeployError, Result};
use crate::forwarder::NodeForwarder;
use crate::metrics::DeployMetrics;
use crate::port_resolution::resolve_port;
use crate::scratch;
use crate::selector::NodeSelector;

use bollard::models::ContainerSummary;
use orc_compose::{
    compose_down, compose_up, discover_by_deployment_label, discover_by_project, require_nonempty, rewrite,
    stack_deploy, stack_name, stack_rm, noop_sanitizer, RewriteOptions, RulesByService, Sanitizer,
};
use orc_persistence::{DeploymentRepository, LocationRepository, RoutingRepository};
use orc_runtime::{ContainerRuntime, NetworkBootstrap};
use orc_types::{Deployment, DeploymentLocation, HealthState, LocationStatus, WorkloadSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct DeploymentManager {
    config: DeployConfig,
    runtime: ContainerRuntime,
    network: NetworkBootstrap,
    deployments: Arc<dyn DeploymentRepository>,
    routing: Arc<dyn RoutingRepository>,
    locations: Arc<dyn LocationRepository>,
    selector: Arc<dyn NodeSelector>,
    forwarder: Arc<dyn NodeForwarder>,
    metrics: Arc<dyn DeployMetrics>,
    sanitizer: Sanitizer,
}

impl DeploymentManager {
    pub fn new(
        config: DeployConfig,
        deployments: Arc<dyn DeploymentRepository>,
        routing: Arc<dyn RoutingRepository>,
        locations: Arc<dyn LocationRepository>,
        selector: Arc<dyn NodeSelector>,
        forwarder: Arc<dyn NodeForwarder>,
        metrics: Arc<dyn DeployMetrics>,
    ) -> Self {
        let network = NetworkBootstrap::new(config.managed_network_name.clone(), config.cluster_mode);
        Self {
            config,
            runtime: ContainerRuntime::new(),
            network,
            deployments,
            routing,
            locations,
            selector,
            forwarder,
            metrics,
            sanitizer: noop_sanitizer(),
        }
    }

    /// Injects a real compose sanitizer; the sanitizer's own policy is out
    /// of scope for this crate.
    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Construction must never fail for network-bootstrap reasons alone:
    /// failures are logged and deferred to the next deploy attempt.
    #[instrument(skip(self))]
    async fn ensure_network(&self) {
        if let Err(e) = self.network.ensure().await {
            warn!(error = %e, "managed network bootstrap deferred");
        }
    }

    /// Returns `true` when the caller should proceed locally: either this
    /// is the selected node, or no forwarder accepted the request.
    async fn should_proceed_locally(&self, deployment_id: &str) -> bool {
        let selected = self.selector.select(deployment_id).await;
        if selected.node_id == self.config.node_id {
            return true;
        }
        if self.forwarder.forward_create(&selected.node_hostname, deployment_id).await {
            info!(deployment_id, node = %selected.node_hostname, "forwarded create to selected node");
            false
        } else {
            warn!(deployment_id, node = %selected.node_hostname, "selected node unreachable, proceeding locally");
            true
        }
    }

    #[instrument(skip(self, deployment))]
    pub async fn create(&self, deployment: Deployment) -> Result<Vec<DeploymentLocation>> {
        self.ensure_network().await;
        if !self.should_proceed_locally(&deployment.deployment_id).await {
            return Ok(Vec::new());
        }

        self.deployments.upsert(deployment.clone()).await?;

        if deployment.is_compose() {
            let yaml = deployment.compose_yaml().unwrap_or_default().to_string();
            let result = self.deploy_compose(&deployment.deployment_id, &yaml).await;
            self.metrics.record_outcome("create", result.is_ok());
            return result;
        }

        let result = self.create_replicas(&deployment).await;
        self.metrics.record_outcome("create", result.is_ok());
        result
    }

    async fn create_replicas(&self, deployment: &Deployment) -> Result<Vec<DeploymentLocation>> {
        let rules = self.routing.list_for_deployment(&deployment.deployment_id).await?;
        let service_name = default_routing::DEFAULT_SERVICE_NAME;
        let port = resolve_port(service_name, &rules, deployment.port);

        let mut created = Vec::with_capacity(deployment.replicas as usize);
        for index in 0..deployment.replicas {
            let name = replica_name(&deployment.deployment_id, service_name, index);
            self.runtime.remove_stale(&name).await?;

            let labels = self.container_labels(deployment, service_name, index, &rules);
            let input = ContainerSpecInput {
                image: deployment.image().unwrap_or_default().to_string(),
                command: deployment.start_command.clone(),
                env_vars: deployment.env_vars.clone(),
                labels,
                network_name: self.config.managed_network_name.clone(),
                container_port: port,
                proxied: !rules.is_empty(),
            };
            let config = derive_config(&input);

            let container_id = self.create_with_retry(&name, config).await?;
            self.runtime.start_container(&container_id).await?;

            let location = self.register_location(deployment, &container_id, port).await?;
            created.push(location);
        }

        if let Some(port) = port {
            default_routing::ensure_default_rule(self.routing.as_ref(), &deployment.deployment_id, &deployment.domain, port)
                .await?;
        }

        Ok(created)
    }

    /// Retries exactly once on a create failure, assuming a stale
    /// name-conflicting container the stop/remove pass above missed a race
    /// with.
    async fn create_with_retry(&self, name: &str, config: bollard::container::Config<String>) -> Result<String> {
        match self.runtime.create_container(name, config.clone()).await {
            Ok(id) => Ok(id),
            Err(_) => {
                warn!(container = name, "create failed, assuming name conflict; removing and retrying once");
                self.runtime.remove_stale(name).await?;
                Ok(self.runtime.create_container(name, config).await?)
            }
        }
    }

    fn container_labels(
        &self,
        deployment: &Deployment,
        service_name: &str,
        index: u32,
        rules: &[orc_types::RoutingRule],
    ) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("orchestrator.managed".to_string(), "true".to_string());
        labels.insert("orchestrator.deployment_id".to_string(), deployment.deployment_id.clone());
        labels.insert("orchestrator.domain".to_string(), deployment.domain.clone());
        labels.insert("orchestrator.service_name".to_string(), service_name.to_string());
        labels.insert("orchestrator.replica".to_string(), index.to_string());

        for rule in rules {
            let router = router_name(&deployment.deployment_id, service_name, rule.index);
            labels.insert("traefik.enable".to_string(), "true".to_string());
            labels.insert(format!("traefik.http.routers.{router}.rule"), format!("Host(`{}`)", rule.domain));
            labels.insert(
                format!("traefik.http.services.{router}.loadbalancer.server.port"),
                rule.target_port.to_string(),
            );
        }
        labels
    }

    async fn register_location(
        &self,
        deployment: &Deployment,
        container_id: &str,
        port: Option<u16>,
    ) -> Result<DeploymentLocation> {
        let now = chrono::Utc::now();
        let location = DeploymentLocation {
            location_id: uuid::Uuid::new_v4().to_string(),
            deployment_id: deployment.deployment_id.clone(),
            node_id: self.config.node_id.clone(),
            node_hostname: self.config.node_hostname.clone(),
            container_id: container_id.to_string(),
            status: LocationStatus::Running,
            port,
            domain: deployment.domain.clone(),
            health_status: HealthState::Unknown,
            created_at: now,
            updated_at: now,
        };
        self.locations.upsert(location.clone()).await?;
        Ok(location)
    }

    /// Missing locations are recreated from the DB row; an orphaned one
    /// (row present, container gone) is also rebuilt. Already-running
    /// locations are a no-op.
    #[instrument(skip(self))]
    pub async fn start(&self, deployment_id: &str) -> Result<()> {
        let deployment = self.deployments.get(deployment_id).await?;
        let locations = self.locations.list_for_node(deployment_id, &self.config.node_id).await?;

        if locations.is_empty() {
            self.create_replicas(&deployment).await?;
            return Ok(());
        }

        let mut needs_recreate = false;
        for mut location in locations {
            let exists = self.runtime.container_exists(&location.container_id).await;
            if location.status == LocationStatus::Running && exists {
                continue;
            }
            if !exists {
                needs_recreate = true;
                continue;
            }
            self.runtime.start_container(&location.container_id).await?;
            location.status = LocationStatus::Running;
            location.updated_at = chrono::Utc::now();
            self.locations.upsert(location).await?;
        }

        if needs_recreate {
            self.create_replicas(&deployment).await?;
        }
        Ok(())
    }

    /// Stop proceeds even if a container is already missing; per-container
    /// failures are swallowed by the runtime layer, never propagated.
    #[instrument(skip(self))]
    pub async fn stop(&self, deployment_id: &str) -> Result<()> {
        let locations = self.locations.list_for_node(deployment_id, &self.config.node_id).await?;
        for mut location in locations {
            self.runtime.stop_container(&location.container_id, Some(10)).await?;
            location.status = LocationStatus::Stopped;
            location.updated_at = chrono::Utc::now();
            if let Err(e) = self.locations.upsert(location).await {
                warn!(deployment_id, error = %e, "failed to persist stopped status, continuing");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, deployment_id: &str) -> Result<()> {
        let locations = self.locations.list_for_node(deployment_id, &self.config.node_id).await?;
        for location in locations {
            self.runtime.stop_container(&location.container_id, Some(10)).await?;
            if let Err(e) = self.runtime.remove_container(&location.container_id, true).await {
                warn!(deployment_id, error = %e, "remove_container failed, continuing best-effort delete");
            }
            if let Err(e) = self.locations.delete(&location.location_id).await {
                warn!(deployment_id, error = %e, "failed to unregister location, continuing");
            }
        }
        scratch::purge_scratch(deployment_id);
        if let Err(e) = self.deployments.delete(deployment_id).await {
            warn!(deployment_id, error = %e, "failed to delete deployment row, continuing");
        }
        Ok(())
    }

    /// Containers are recreated from the DB row so label/env/health changes
    /// take effect; compose deployments redeploy the same document.
    #[instrument(skip(self))]
    pub async fn restart(&self, deployment_id: &str) -> Result<()> {
        let deployment = self.deployments.get(deployment_id).await?;
        if deployment.is_compose() {
            self.stop_compose(deployment_id).await?;
            let yaml = deployment.compose_yaml().unwrap_or_default().to_string();
            self.deploy_compose(deployment_id, &yaml).await?;
            return Ok(());
        }
        self.create_replicas(&deployment).await?;
        Ok(())
    }

    /// Scale-down removes trailing replicas; scale-up is not implemented.
    #[instrument(skip(self))]
    pub async fn scale(&self, deployment_id: &str, replicas: u32) -> Result<()> {
        let mut deployment = self.deployments.get(deployment_id).await?;
        if replicas > deployment.replicas {
            return Err(DeployError::ScaleUpNotImplemented);
        }
        if replicas == deployment.replicas {
            return Ok(());
        }

        for index in replicas..deployment.replicas {
            let name = replica_name(deployment_id, default_routing::DEFAULT_SERVICE_NAME, index);
            let container_id = self.runtime.inspect_container(&name).await.ok().and_then(|c| c.id);
            self.runtime.remove_stale(&name).await?;
            if let Some(container_id) = container_id {
                let locations = self.locations.list_for_node(deployment_id, &self.config.node_id).await?;
                if let Some(location) = locations.into_iter().find(|l| l.container_id == container_id) {
                    self.locations.delete(&location.location_id).await.ok();
                }
            }
        }

        deployment.replicas = replicas;
        self.deployments.upsert(deployment).await?;
        Ok(())
    }

    #[instrument(skip(self, yaml))]
    pub async fn deploy_compose(&self, deployment_id: &str, yaml: &str) -> Result<Vec<DeploymentLocation>> {
        self.ensure_network().await;

        let parsed: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let sanitized = (self.sanitizer)(parsed);
        let doc: serde_yaml::Value = serde_yaml::from_str(&serde_yaml::to_string(&sanitized)?)?;

        let rules = self.routing.list_for_deployment(deployment_id).await?;
        let mut by_service: RulesByService = RulesByService::new();
        for rule in rules {
            by_service.entry(rule.service_name.clone()).or_default().push(rule);
        }
        for rules in by_service.values_mut() {
            rules.sort_by_key(|r| r.index);
        }

        let deployment = self.deployments.get(deployment_id).await?;
        let opts = RewriteOptions {
            deployment_id: deployment_id.to_string(),
            cluster_mode: self.config.cluster_mode,
            managed_network_name: self.config.managed_network_name.clone(),
            declared_port: deployment.port,
        };
        let rewritten = rewrite(doc, &by_service, &opts)?;
        let rendered = serde_yaml::to_string(&rewritten)?;

        let scratch_dir = scratch::ensure_scratch_dir(deployment_id)?;
        let compose_file = scratch::compose_file_path(&scratch_dir);
        tokio::fs::write(&compose_file, &rendered).await?;

        let project = stack_name(deployment_id);
        let containers = if self.config.cluster_mode {
            stack_deploy(&project, &compose_file).await?;
            self.verify_cluster_discovery_labels(&rewritten);
            discover_by_deployment_label(&self.runtime, deployment_id).await?
        } else {
            compose_up(&project, &compose_file).await?;
            discover_by_project(&self.runtime, &project).await?
        };
        let containers = require_nonempty(containers, deployment_id)?;

        if !matches!(deployment.source, WorkloadSource::Compose(ref existing) if existing == yaml) {
            let mut updated = deployment.clone();
            updated.source = WorkloadSource::Compose(yaml.to_string());
            self.deployments.upsert(updated).await?;
        }

        let locations = self.register_compose_containers(deployment_id, &deployment.domain, &containers).await?;

        let first_port = by_service
            .values()
            .flat_map(|v| v.first())
            .map(|r| r.target_port)
            .next()
            .or_else(|| locations.first().and_then(|l| l.port));
        if let Some(port) = first_port {
            default_routing::ensure_default_rule(self.routing.as_ref(), deployment_id, &deployment.domain, port).await?;
        }

        Ok(locations)
    }

    /// Cluster-mode discovery labels live under `deploy.labels`; this warns
    /// rather than errors when a service comes back without one, since the
    /// apply tool itself already succeeded.
    fn verify_cluster_discovery_labels(&self, rewritten: &serde_yaml::Value) {
        let Some(services) = rewritten.get("services").and_then(|v| v.as_mapping()) else {
            return;
        };
        for (name, svc) in services {
            let labels = svc.get("deploy").and_then(|d| d.get("labels"));
            let map = orc_compose::yaml_util::value_to_map(labels);
            if !map.contains_key("orchestrator.managed") {
                warn!(service = name.as_str().unwrap_or("?"), "cluster-mode service missing managed discovery label after apply");
            }
        }
    }

    async fn register_compose_containers(
        &self,
        deployment_id: &str,
        fallback_domain: &str,
        containers: &[ContainerSummary],
    ) -> Result<Vec<DeploymentLocation>> {
        let mut registered = Vec::with_capacity(containers.len());
        for container in containers {
            let container_id = container.id.clone().unwrap_or_default();
            let labels = container.labels.clone().unwrap_or_default();
            let domain = labels.get("orchestrator.domain").cloned().unwrap_or_else(|| fallback_domain.to_string());
            let port = labels.get("orchestrator.port").and_then(|p| p.parse().ok());
            let now = chrono::Utc::now();
            let location = DeploymentLocation {
                location_id: uuid::Uuid::new_v4().to_string(),
                deployment_id: deployment_id.to_string(),
                node_id: self.config.node_id.clone(),
                node_hostname: self.config.node_hostname.clone(),
                container_id,
                status: LocationStatus::Running,
                port,
                domain,
                health_status: HealthState::Unknown,
                created_at: now,
                updated_at: now,
            };
            self.locations.upsert(location.clone()).await?;
            registered.push(location);
        }
        Ok(registered)
    }

    #[instrument(skip(self))]
    pub async fn stop_compose(&self, deployment_id: &str) -> Result<()> {
        let project = stack_name(deployment_id);
        let scratch_dir = scratch::ensure_scratch_dir(deployment_id)?;
        let compose_file = scratch::compose_file_path(&scratch_dir);
        if self.config.cluster_mode {
            stack_rm(&project, deployment_id).await?;
        } else {
            compose_down(&project, &compose_file, deployment_id).await?;
        }
        for mut location in self.locations.list_for_node(deployment_id, &self.config.node_id).await? {
            location.status = LocationStatus::Stopped;
            location.updated_at = chrono::Utc::now();
            self.locations.upsert(location).await.ok();
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_compose(&self, deployment_id: &str) -> Result<()> {
        self.stop_compose(deployment_id).await?;
        for location in self.locations.list_for_node(deployment_id, &self.config.node_id).await? {
            self.locations.delete(&location.location_id).await.ok();
        }
        scratch::purge_scratch(deployment_id);
        self.deployments.delete(deployment_id).await.ok();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_logs(&self, deployment_id: &str, tail_lines: usize) -> Result<String> {
        let locations = self.locations.list_for_node(deployment_id, &self.config.node_id).await?;
        let location = locations
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NoLocalContainer(deployment_id.to_string()))?;
        Ok(self.runtime.tail_logs(&location.container_id, tail_lines).await?)
    }
}

fn replica_name(deployment_id: &str, service_name: &str, index: u32) -> String {
    format!("{deployment_id}-{service_name}-replica-{index}")
}

fn router_name(deployment_id: &str, service_name: &str, index: u32) -> String {
    let mut name = deployment_id.to_string();
    if !service_name.is_empty() && service_name != default_routing::DEFAULT_SERVICE_NAME {
        name.push('-');
        name.push_str(service_name);
    }
    if index > 0 {
        name.push('-');
        name.push_str(&index.to_string());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::NoopForwarder;
    use crate::metrics::NoopMetrics;
    use crate::selector::LocalNodeSelector;
    use orc_persistence::InMemoryGateway;
    use orc_types::WorkloadSource;

    fn test_manager() -> DeploymentManager {
        let gateway = Arc::new(InMemoryGateway::new());
        let config = DeployConfig::local("host1", "deploy-net", false);
        DeploymentManager::new(
            config,
            gateway.clone(),
            gateway.clone(),
            gateway,
            Arc::new(LocalNodeSelector::new("local-host1", "host1")),
            Arc::new(NoopForwarder),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn replica_name_is_deterministic() {
        assert_eq!(replica_name("dep1", "default", 0), "dep1-default-replica-0");
        assert_eq!(replica_name("dep1", "default", 2), "dep1-default-replica-2");
    }

    #[test]
    fn router_name_omits_default_service_and_zero_index() {
        assert_eq!(router_name("dep1", "default", 0), "dep1");
        assert_eq!(router_name("dep1", "worker", 0), "dep1-worker");
        assert_eq!(router_name("dep1", "default", 2), "dep1-2");
    }

    #[test]
    fn container_labels_include_management_keys() {
        let manager = test_manager();
        let deployment =
            Deployment::new("dep1", WorkloadSource::Image("alpine:3.20".into()), "dep1.example").unwrap();
        let labels = manager.container_labels(&deployment, "default", 0, &[]);
        assert_eq!(labels.get("orchestrator.deployment_id"), Some(&"dep1".to_string()));
        assert_eq!(labels.get("orchestrator.domain"), Some(&"dep1.example".to_string()));
        assert!(!labels.contains_key("traefik.enable"));
    }

    #[test]
    fn container_labels_add_discovery_labels_when_routed() {
        let manager = test_manager();
        let deployment =
            Deployment::new("dep1", WorkloadSource::Image("alpine:3.20".into()), "dep1.example").unwrap();
        let rule = orc_types::RoutingRule::new("dep1", "default", 0, "dep1.example", 8080).unwrap();
        let labels = manager.container_labels(&deployment, "default", 0, &[rule]);
        assert_eq!(labels.get("traefik.enable"), Some(&"true".to_string()));
        assert_eq!(labels.get("traefik.http.routers.dep1.rule"), Some(&"Host(`dep1.example`)".to_string()));
    }

    #[tokio::test]
    async fn scale_up_is_rejected() {
        let manager = test_manager();
        let deployment =
            Deployment::new("dep1", WorkloadSource::Image("alpine:3.20".into()), "dep1.example").unwrap();
        manager.deployments.upsert(deployment).await.unwrap();
        let result = manager.scale("dep1", 5).await;
        assert!(matches!(result, Err(DeployError::ScaleUpNotImplemented)));
    }

    #[tokio::test]
    async fn scale_to_same_replica_count_is_a_noop() {
        let manager = test_manager();
        let deployment =
            Deployment::new("dep1", WorkloadSource::Image("alpine:3.20".into()), "dep1.example").unwrap();
        manager.deployments.upsert(deployment).await.unwrap();
        manager.scale("dep1", 1).await.unwrap();
        let reloaded = manager.deployments.get("dep1").await.unwrap();
        assert_eq!(reloaded.replicas, 1);
    }
}
