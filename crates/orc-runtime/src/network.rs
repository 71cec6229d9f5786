//! Ensures the managed overlay/bridge network that every container
//! deployment attaches to.

use crate::error::Result;
use crate::pool::get_runtime_connection;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Label used to tag the managed network so it can be found again and so
/// operators can distinguish it from user-created networks.
pub const MANAGED_NETWORK_LABEL: &str = "orchestrator.managed=true";

#[derive(Debug, Clone)]
pub struct NetworkBootstrap {
    pub name: String,
    pub driver: String,
}

impl NetworkBootstrap {
    pub fn new(name: impl Into<String>, cluster_mode: bool) -> Self {
        Self { name: name.into(), driver: if cluster_mode { "overlay".to_string() } else { "bridge".to_string() } }
    }

    /// Idempotent: "already exists" is a success outcome, including when a
    /// concurrent creator races us. If the daemon is unreachable, the error
    /// is returned to the caller for deferral — construction must never
    /// fail for this reason alone (the manager retries on the next deploy).
    pub async fn ensure(&self) -> Result<()> {
        let connection = get_runtime_connection().await?;
        let docker = connection.docker();

        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![self.name.clone()]);
        let existing = docker.list_networks(Some(ListNetworksOptions { filters })).await?;
        if existing.iter().any(|n| n.name.as_deref() == Some(self.name.as_str())) {
            debug!(network = %self.name, "managed network already present");
            return Ok(());
        }

        let mut labels = HashMap::new();
        labels.insert("orchestrator.managed".to_string(), "true".to_string());

        let options = CreateNetworkOptions {
            name: self.name.clone(),
            driver: self.driver.clone(),
            labels,
            ..Default::default()
        };

        match docker.create_network(options).await {
            Ok(_) => {
                info!(network = %self.name, "created managed network");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => {
                warn!(network = %self.name, "managed network creation raced with another creator, accepting");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
