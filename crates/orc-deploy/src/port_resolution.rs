//! Port-resolution priority for single-image deployments:
//! 1. routing rule for this exact service name
//! 2. a `default`/empty-named rule, when the service itself is `default`
//! 3. first routing rule anywhere for the deployment (by service name, for
//!    determinism)
//! 4. deployment's declared port
//! 5. `None`
//!
//! There is no compose document to fall back to here (that variant lives in
//! `orc_compose::rewriter`); a single-image deployment either names a port
//! through one of the first four or exposes none.

use orc_types::RoutingRule;

pub const DEFAULT_SERVICE_NAME: &str = "default";

pub fn resolve_port(service_name: &str, rules: &[RoutingRule], declared_port: Option<u16>) -> Option<u16> {
    if let Some(rule) = rules.iter().find(|r| r.service_name == service_name) {
        return Some(rule.target_port);
    }
    if service_name == DEFAULT_SERVICE_NAME {
        if let Some(rule) = rules.iter().find(|r| r.service_name.is_empty()) {
            return Some(rule.target_port);
        }
    }
    let mut by_service: Vec<&RoutingRule> = rules.iter().collect();
    by_service.sort_by(|a, b| a.service_name.cmp(&b.service_name).then(a.index.cmp(&b.index)));
    if let Some(rule) = by_service.first() {
        return Some(rule.target_port);
    }
    declared_port
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(service: &str, port: u16) -> RoutingRule {
        RoutingRule::new("dep1", service, 0, "dep1.example", port).unwrap()
    }

    #[test]
    fn exact_service_match_wins() {
        let rules = vec![rule("default", 8080), rule("worker", 9090)];
        assert_eq!(resolve_port("worker", &rules, Some(3000)), Some(9090));
    }

    #[test]
    fn default_service_falls_back_to_empty_named_rule() {
        let rules = vec![rule("", 8080)];
        assert_eq!(resolve_port("default", &rules, None), Some(8080));
    }

    #[test]
    fn falls_back_to_first_rule_anywhere() {
        let rules = vec![rule("worker", 9090)];
        assert_eq!(resolve_port("default", &rules, None), Some(9090));
    }

    #[test]
    fn falls_back_to_declared_port_when_no_rules() {
        assert_eq!(resolve_port("default", &[], Some(3000)), Some(3000));
    }

    #[test]
    fn none_when_nothing_resolves() {
        assert_eq!(resolve_port("default", &[], None), None);
    }
}
