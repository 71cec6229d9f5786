//! Config layering for the operator CLI: built-in defaults, then an
//! optional TOML file, then environment overrides — the same layered
//! `config`/`toml` setup used elsewhere in this control plane, generalized
//! to the orchestrator's env surface.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub node_hostname: String,
    pub managed_network_name: String,
    pub cluster_mode: bool,
    pub storage_pool: String,
    pub vlan_id: Option<u32>,
    pub vm_id_start: Option<u32>,
    pub hypervisor_base_url: String,
    pub hypervisor_username: String,
    pub hypervisor_password: String,
    pub hypervisor_verify_tls: bool,
    pub vps_gateway_url: Option<String>,
    pub vps_gateway_bridge: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_hostname: hostname(),
            managed_network_name: "orchestrator-net".to_string(),
            cluster_mode: false,
            storage_pool: "local".to_string(),
            vlan_id: None,
            vm_id_start: None,
            hypervisor_base_url: "https://localhost:8006/api2/json".to_string(),
            hypervisor_username: "root@pam".to_string(),
            hypervisor_password: String::new(),
            hypervisor_verify_tls: false,
            vps_gateway_url: None,
            vps_gateway_bridge: None,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Layers defaults → `file` (if present) → environment. The spec-named env
/// vars (`<APP>_STORAGE_POOL`, `<APP>_VLAN_ID`, `<APP>_VM_ID_START`,
/// `ENABLE_SWARM`, `VPS_GATEWAY_URL`, `VPS_GATEWAY_BRIDGE`) are read through
/// this single layer rather than scattered `std::env::var` call sites.
pub fn load(file: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = Config::builder()
        .set_default("node_hostname", defaults.node_hostname)?
        .set_default("managed_network_name", defaults.managed_network_name)?
        .set_default("cluster_mode", defaults.cluster_mode)?
        .set_default("storage_pool", defaults.storage_pool)?
        .set_default("hypervisor_base_url", defaults.hypervisor_base_url)?
        .set_default("hypervisor_username", defaults.hypervisor_username)?
        .set_default("hypervisor_password", defaults.hypervisor_password)?
        .set_default("hypervisor_verify_tls", defaults.hypervisor_verify_tls)?;

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("ORC").try_parsing(true).separator("_"));

    let mut config: AppConfig = builder.build()?.try_deserialize()?;

    // These four are spec-mandated bare names, not `ORC_`-prefixed.
    if let Ok(swarm) = std::env::var("ENABLE_SWARM") {
        config.cluster_mode = parse_bool_flag(&swarm);
    }
    if let Ok(url) = std::env::var("VPS_GATEWAY_URL") {
        config.vps_gateway_url = Some(url);
    }
    if let Ok(bridge) = std::env::var("VPS_GATEWAY_BRIDGE") {
        config.vps_gateway_bridge = Some(bridge);
    }

    Ok(config)
}

/// `true|1|yes|on` (case-insensitive) are accepted as truthy for `ENABLE_SWARM`.
fn parse_bool_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_flag_accepts_documented_truthy_values() {
        for v in ["true", "1", "yes", "on", "TRUE", "On"] {
            assert!(parse_bool_flag(v), "{v} should be truthy");
        }
        assert!(!parse_bool_flag("false"));
        assert!(!parse_bool_flag(""));
    }

    #[test]
    fn defaults_load_without_a_file_or_env() {
        let config = load(None).unwrap();
        assert_eq!(config.storage_pool, "local");
        assert!(!config.cluster_mode);
    }
}
