//! Default-routing insertion: on first successful create, if no routing
//! rules exist yet for the deployment, a single default rule is inserted
//! and never overwritten again — subsequent calls leave operator-edited
//! rules alone.

use orc_persistence::RoutingRepository;
use orc_types::RoutingRule;

pub const DEFAULT_SERVICE_NAME: &str = "default";

pub async fn ensure_default_rule(
    repository: &dyn RoutingRepository,
    deployment_id: &str,
    domain: &str,
    port: u16,
) -> orc_persistence::Result<()> {
    let existing = repository.list_for_deployment(deployment_id).await?;
    if !existing.is_empty() {
        return Ok(());
    }
    if let Ok(rule) = RoutingRule::new(deployment_id, DEFAULT_SERVICE_NAME, 0, domain, port) {
        repository.insert(rule).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_persistence::InMemoryGateway;

    #[tokio::test]
    async fn inserts_a_default_rule_when_none_exist() {
        let gateway = InMemoryGateway::new();
        ensure_default_rule(&gateway, "dep1", "dep1.example", 8080).await.unwrap();
        let rules = gateway.list_for_deployment("dep1").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(rules[0].target_port, 8080);
    }

    #[tokio::test]
    async fn never_overwrites_existing_rules() {
        let gateway = InMemoryGateway::new();
        let rule = RoutingRule::new("dep1", "custom", 0, "custom.example", 9090).unwrap();
        gateway.insert(rule).await.unwrap();

        ensure_default_rule(&gateway, "dep1", "dep1.example", 8080).await.unwrap();
        let rules = gateway.list_for_deployment("dep1").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].service_name, "custom");
    }
}
