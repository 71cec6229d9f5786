//! Aggregate health reporting: each subsystem (container runtime
//! reachability, persistence gateway, hypervisor connectivity) implements
//! `HealthCheck`, and `aggregate_status` rolls the individual results up
//! into one status for a readiness endpoint or startup log line.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> ComponentHealth;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

pub async fn aggregate_status(checks: &[Box<dyn HealthCheck>]) -> SystemHealth {
    let mut components = Vec::with_capacity(checks.len());
    for check in checks {
        components.push(check.check().await);
    }
    let status = overall_status(&components);
    SystemHealth { status, components }
}

fn overall_status(components: &[ComponentHealth]) -> HealthStatus {
    if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthCheck for AlwaysHealthy {
        fn name(&self) -> &str {
            "always-healthy"
        }

        async fn check(&self) -> ComponentHealth {
            ComponentHealth { name: self.name().to_string(), status: HealthStatus::Healthy, message: None }
        }
    }

    struct AlwaysUnhealthy;

    #[async_trait]
    impl HealthCheck for AlwaysUnhealthy {
        fn name(&self) -> &str {
            "always-unhealthy"
        }

        async fn check(&self) -> ComponentHealth {
            ComponentHealth {
                name: self.name().to_string(),
                status: HealthStatus::Unhealthy,
                message: Some("simulated failure".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn empty_check_list_is_healthy() {
        let result = aggregate_status(&[]).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn a_single_unhealthy_component_drags_down_the_overall_status() {
        let checks: Vec<Box<dyn HealthCheck>> = vec![Box::new(AlwaysHealthy), Box::new(AlwaysUnhealthy)];
        let result = aggregate_status(&checks).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.components.len(), 2);
    }
}
