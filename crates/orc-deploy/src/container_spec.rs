//! Derives a `bollard::container::Config` for a single-image replica:
//! labels, env hints, port exposure, health check, restart policy. No
//! privileged mode, ever.

use bollard::container::Config;
use bollard::models::{HealthConfig, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use std::collections::HashMap;

/// Env vars that hint build systems (Nixpacks, Railpack) to install the
/// `nc` binary the health check shells out to.
const APT_HINT_VARS: [(&str, &str); 2] =
    [("NIXPACKS_APT_PKGS", "netcat-openbsd"), ("RAILPACK_DEPLOY_APT_PACKAGES", "netcat-openbsd")];

const HEALTHCHECK_INTERVAL_NANOS: i64 = 30_000_000_000;
const HEALTHCHECK_TIMEOUT_NANOS: i64 = 10_000_000_000;
const HEALTHCHECK_START_PERIOD_NANOS: i64 = 40_000_000_000;
const HEALTHCHECK_RETRIES: i64 = 3;

#[derive(Debug, Clone)]
pub struct ContainerSpecInput {
    pub image: String,
    pub command: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub network_name: String,
    pub container_port: Option<u16>,
    /// A routed (proxied) container is reached through the managed network
    /// only; an unproxied one gets a host port assigned by the runtime.
    pub proxied: bool,
}

pub fn derive_config(input: &ContainerSpecInput) -> Config<String> {
    let mut env: Vec<String> = input.env_vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
    if input.container_port.is_some() {
        for (key, value) in APT_HINT_VARS {
            env.push(format!("{key}={value}"));
        }
    }
    env.sort();

    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();
    if let Some(port) = input.container_port {
        let key = format!("{port}/tcp");
        exposed_ports.insert(key.clone(), HashMap::new());
        if !input.proxied {
            port_bindings.insert(key, Some(vec![PortBinding { host_ip: None, host_port: None }]));
        }
    }

    let healthcheck = input.container_port.map(|port| HealthConfig {
        test: Some(vec!["CMD-SHELL".to_string(), health_check_command(port)]),
        interval: Some(HEALTHCHECK_INTERVAL_NANOS),
        timeout: Some(HEALTHCHECK_TIMEOUT_NANOS),
        retries: Some(HEALTHCHECK_RETRIES),
        start_period: Some(HEALTHCHECK_START_PERIOD_NANOS),
        ..Default::default()
    });

    let host_config = HostConfig {
        network_mode: Some(input.network_name.clone()),
        port_bindings: if port_bindings.is_empty() { None } else { Some(port_bindings) },
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        }),
        privileged: Some(false),
        ..Default::default()
    };

    Config {
        image: Some(input.image.clone()),
        cmd: input.command.as_deref().map(shell_command),
        env: Some(env),
        labels: Some(input.labels.clone()),
        exposed_ports: if exposed_ports.is_empty() { None } else { Some(exposed_ports) },
        host_config: Some(host_config),
        healthcheck,
        ..Default::default()
    }
}

/// `nc -z` with a portable install fallback across apk/apt/yum-based images
/// (mirrors `orc_compose::rewriter`'s compose-path health check verbatim so
/// a single-image and a compose-described version of the same app behave
/// identically).
pub fn health_check_command(port: u16) -> String {
    format!(
        "nc -z localhost {port} || (apk add --no-cache netcat-openbsd || apt-get install -y netcat-openbsd || yum install -y nc) && nc -z localhost {port}"
    )
}

fn shell_command(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> ContainerSpecInput {
        ContainerSpecInput {
            image: "alpine:3.20".to_string(),
            command: None,
            env_vars: HashMap::new(),
            labels: HashMap::new(),
            network_name: "deploy-net".to_string(),
            container_port: None,
            proxied: false,
        }
    }

    #[test]
    fn never_sets_privileged() {
        let config = derive_config(&base_input());
        assert_eq!(config.host_config.unwrap().privileged, Some(false));
    }

    #[test]
    fn unproxied_port_gets_a_host_binding() {
        let mut input = base_input();
        input.container_port = Some(8080);
        let config = derive_config(&input);
        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        assert!(bindings.contains_key("8080/tcp"));
    }

    #[test]
    fn proxied_port_is_exposed_without_a_host_binding() {
        let mut input = base_input();
        input.container_port = Some(8080);
        input.proxied = true;
        let config = derive_config(&input);
        assert!(config.exposed_ports.unwrap().contains_key("8080/tcp"));
        assert!(config.host_config.unwrap().port_bindings.is_none());
    }

    #[test]
    fn no_port_means_no_healthcheck() {
        let config = derive_config(&base_input());
        assert!(config.healthcheck.is_none());
    }

    #[test]
    fn known_port_injects_apt_hints_for_netcat() {
        let mut input = base_input();
        input.container_port = Some(3000);
        let config = derive_config(&input);
        let env = config.env.unwrap();
        assert!(env.iter().any(|e| e.starts_with("NIXPACKS_APT_PKGS=")));
        assert!(env.iter().any(|e| e.starts_with("RAILPACK_DEPLOY_APT_PACKAGES=")));
    }

    #[test]
    fn restart_policy_is_unless_stopped() {
        let config = derive_config(&base_input());
        let policy = config.host_config.unwrap().restart_policy.unwrap();
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::UNLESS_STOPPED));
    }
}
