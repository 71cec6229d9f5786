//! Wires the config layer into the Deployment Manager and Hypervisor Client
//! and dispatches each CLI subcommand against them.

use crate::cli::{ConsoleKind, VmCommands};
use crate::config::AppConfig;
use crate::error::CliError;

use orc_compose::noop_sanitizer;
use orc_deploy::config::DeployConfig;
use orc_deploy::forwarder::NoopForwarder;
use orc_deploy::manager::DeploymentManager;
use orc_deploy::metrics::NoopMetrics;
use orc_deploy::selector::LocalNodeSelector;
use orc_hypervisor::auth::AuthMode;
use orc_hypervisor::client::HypervisorClient;
use orc_hypervisor::config::HypervisorConfig;
use orc_hypervisor::firewall::FirewallIntent;
use orc_persistence::InMemoryGateway;
use orc_types::{Deployment, ImageSelector, Vps, VpsFlavor, WorkloadSource};

use std::sync::Arc;
use tracing::info;

pub struct CommandHandler {
    deploy: DeploymentManager,
    hypervisor: HypervisorClient,
}

impl CommandHandler {
    pub fn new(config: &AppConfig) -> Result<Self, CliError> {
        let gateway = Arc::new(InMemoryGateway::new());
        let deploy_config = DeployConfig::local(
            config.node_hostname.clone(),
            config.managed_network_name.clone(),
            config.cluster_mode,
        );
        let selector = Arc::new(LocalNodeSelector::new(deploy_config.node_id.clone(), deploy_config.node_hostname.clone()));

        let deploy = DeploymentManager::new(
            deploy_config,
            gateway.clone(),
            gateway.clone(),
            gateway.clone(),
            selector,
            Arc::new(NoopForwarder),
            Arc::new(NoopMetrics),
        )
        .with_sanitizer(noop_sanitizer());

        let hypervisor_config = HypervisorConfig {
            base_url: config.hypervisor_base_url.clone(),
            storage_pool: config.storage_pool.clone(),
            vlan_id: config.vlan_id,
            vm_id_start: config.vm_id_start,
            verify_tls: config.hypervisor_verify_tls,
            request_timeout_secs: 30,
        };
        let auth = AuthMode::Password {
            username: config.hypervisor_username.clone(),
            password: config.hypervisor_password.clone(),
        };
        let hypervisor = HypervisorClient::new(hypervisor_config, auth)?;

        Ok(Self { deploy, hypervisor })
    }

    pub async fn deploy_image(
        &self,
        deployment_id: String,
        image: String,
        domain: String,
        port: Option<u16>,
        replicas: Option<u32>,
    ) -> Result<(), CliError> {
        let mut deployment = Deployment::new(deployment_id, WorkloadSource::Image(image), domain)?;
        deployment.port = port;
        if let Some(replicas) = replicas {
            deployment.replicas = replicas;
        }
        let locations = self.deploy.create(deployment).await?;
        info!(count = locations.len(), "deployment created");
        for location in locations {
            println!("{} -> {}", location.location_id, location.node_id);
        }
        Ok(())
    }

    pub async fn deploy_compose(&self, deployment_id: String, compose_file: std::path::PathBuf, domain: String) -> Result<(), CliError> {
        let yaml = std::fs::read_to_string(&compose_file)
            .map_err(|e| CliError::Other(anyhow::anyhow!("reading {}: {e}", compose_file.display())))?;
        let deployment = Deployment::new(deployment_id.clone(), WorkloadSource::Compose(yaml), domain)?;
        self.deploy.create(deployment).await?;
        println!("compose stack deployed for {deployment_id}");
        Ok(())
    }

    pub async fn start(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.start(deployment_id).await?;
        println!("{deployment_id} started");
        Ok(())
    }

    pub async fn stop(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.stop(deployment_id).await?;
        println!("{deployment_id} stopped");
        Ok(())
    }

    pub async fn delete(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.delete(deployment_id).await?;
        println!("{deployment_id} deleted");
        Ok(())
    }

    pub async fn restart(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.restart(deployment_id).await?;
        println!("{deployment_id} restarted");
        Ok(())
    }

    pub async fn scale(&self, deployment_id: &str, replicas: u32) -> Result<(), CliError> {
        self.deploy.scale(deployment_id, replicas).await?;
        println!("{deployment_id} scaled to {replicas}");
        Ok(())
    }

    pub async fn stop_compose(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.stop_compose(deployment_id).await?;
        println!("compose stack stopped for {deployment_id}");
        Ok(())
    }

    pub async fn remove_compose(&self, deployment_id: &str) -> Result<(), CliError> {
        self.deploy.remove_compose(deployment_id).await?;
        println!("compose stack removed for {deployment_id}");
        Ok(())
    }

    pub async fn logs(&self, deployment_id: &str, tail: usize) -> Result<(), CliError> {
        let output = self.deploy.get_logs(deployment_id, tail).await?;
        print!("{output}");
        Ok(())
    }

    pub async fn vm(&self, command: VmCommands) -> Result<(), CliError> {
        match command {
            VmCommands::Create { vps_id, display_name, organization_id, cpu_cores, memory_mib, disk_gib, image, isolate } => {
                let flavor = VpsFlavor {
                    cpu_cores,
                    memory_bytes: memory_mib * 1024 * 1024,
                    disk_bytes: disk_gib * 1024 * 1024 * 1024,
                };
                let vps = Vps::new(vps_id, display_name, organization_id, flavor, parse_image(&image))?;
                let firewall = FirewallIntent { isolate, allow_inter_vm: false };
                let created = self.hypervisor.create_vm(&vps, &[], firewall).await?;
                println!(
                    "vmid={} node={} user={} password={}",
                    created.vmid, created.node, created.credentials.username, created.credentials.password
                );
            }
            VmCommands::Delete { node, vmid, vps_id } => {
                self.hypervisor.delete_vm(&node, vmid, &vps_id).await?;
                println!("vmid {vmid} on {node} deleted");
            }
            VmCommands::Console { node, vmid, host, kind } => {
                let url = match kind {
                    ConsoleKind::Vnc => self.hypervisor.vnc_websocket(&node, vmid, &host).await?,
                    ConsoleKind::Termproxy => self.hypervisor.termproxy(&node, vmid, &host).await?.0,
                    ConsoleKind::Serial => self.hypervisor.serial_console(&node, vmid, &host).await?,
                };
                println!("{url}");
            }
        }
        Ok(())
    }
}

fn parse_image(name: &str) -> ImageSelector {
    match name {
        "ubuntu2204" => ImageSelector::Ubuntu2204,
        "ubuntu2404" => ImageSelector::Ubuntu2404,
        "debian12" => ImageSelector::Debian12,
        other => ImageSelector::Custom(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_builtin_image_names() {
        assert_eq!(parse_image("ubuntu2204"), ImageSelector::Ubuntu2204);
        assert_eq!(parse_image("debian12"), ImageSelector::Debian12);
        assert_eq!(parse_image("golden-image-v3"), ImageSelector::Custom("golden-image-v3".to_string()));
    }

    #[test]
    fn handler_wires_up_from_default_config() {
        let config = AppConfig::default();
        assert!(CommandHandler::new(&config).is_ok());
    }
}
