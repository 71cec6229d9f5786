//! The `Deployment` entity — desired state for a container workload.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Either a single image reference, or a full compose document.
///
/// A runnable deployment needs at least one of these; both may never be
/// required simultaneously (a compose deployment's services carry their own
/// images).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkloadSource {
    Image(String),
    Compose(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: String,
    pub source: WorkloadSource,
    pub domain: String,
    pub start_command: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub memory_bytes: u64,
    pub cpu_shares: u32,
    pub replicas: u32,
    /// Declared port, used as a fallback in the port-resolution priority
    /// when no routing rule names one.
    pub port: Option<u16>,
}

impl Deployment {
    pub fn new(deployment_id: impl Into<String>, source: WorkloadSource, domain: impl Into<String>) -> Result<Self> {
        let deployment = Self {
            deployment_id: deployment_id.into(),
            source,
            domain: domain.into(),
            start_command: None,
            env_vars: HashMap::new(),
            memory_bytes: 256 * 1024 * 1024,
            cpu_shares: 512,
            replicas: 1,
            port: None,
        };
        deployment.validate()?;
        Ok(deployment)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deployment_id.trim().is_empty() {
            return Err(CommonError::Validation("deployment_id must not be empty".into()));
        }
        if self.domain.trim().is_empty() {
            return Err(CommonError::Validation("domain must not be empty".into()));
        }
        if self.replicas == 0 {
            return Err(CommonError::Validation("replicas must be >= 1".into()));
        }
        if let WorkloadSource::Image(image) = &self.source {
            if image.trim().is_empty() {
                return Err(CommonError::Validation("image reference must not be empty".into()));
            }
        }
        if let WorkloadSource::Compose(yaml) = &self.source {
            if yaml.trim().is_empty() {
                return Err(CommonError::Validation("compose_yaml must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn is_compose(&self) -> bool {
        matches!(self.source, WorkloadSource::Compose(_))
    }

    pub fn image(&self) -> Option<&str> {
        match &self.source {
            WorkloadSource::Image(image) => Some(image),
            WorkloadSource::Compose(_) => None,
        }
    }

    pub fn compose_yaml(&self) -> Option<&str> {
        match &self.source {
            WorkloadSource::Compose(yaml) => Some(yaml),
            WorkloadSource::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_deployment_id() {
        let err = Deployment::new("", WorkloadSource::Image("alpine:3.20".into()), "d1.example");
        assert!(err.is_err());
    }

    #[test]
    fn rejects_zero_replicas() {
        let mut d = Deployment::new("d1", WorkloadSource::Image("alpine:3.20".into()), "d1.example").unwrap();
        d.replicas = 0;
        assert!(d.validate().is_err());
    }

    #[test]
    fn accepts_compose_source() {
        let d = Deployment::new("d2", WorkloadSource::Compose("services: {}".into()), "d2.example");
        assert!(d.is_ok());
        assert!(d.unwrap().is_compose());
    }
}
