//! Deployment Manager configuration: this controller's identity and the
//! managed network it reconciles against.

#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// This controller instance's identity: either the runtime's cluster
    /// node id, or a synthetic `local-{hostname}` for standalone use.
    pub node_id: String,
    pub node_hostname: String,
    pub managed_network_name: String,
    /// Compose deployments use `stack deploy`/`stack rm` instead of
    /// `docker-compose up`/`down` when set.
    pub cluster_mode: bool,
}

impl DeployConfig {
    /// Synthesizes a `local-{hostname}` identity; the selector passed to
    /// `DeploymentManager` must agree on the same scheme.
    pub fn local(hostname: impl Into<String>, managed_network_name: impl Into<String>, cluster_mode: bool) -> Self {
        let hostname = hostname.into();
        Self {
            node_id: format!("local-{hostname}"),
            node_hostname: hostname,
            managed_network_name: managed_network_name.into(),
            cluster_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_identity_is_prefixed() {
        let config = DeployConfig::local("host1", "deploy-net", false);
        assert_eq!(config.node_id, "local-host1");
        assert_eq!(config.node_hostname, "host1");
    }
}
