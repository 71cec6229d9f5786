//! The Compose Rewriter: a pure function over a parsed compose document.
//!
//! Given routing rules for a deployment, it injects reverse-proxy discovery
//! labels, swaps `ports:` for `expose:` on proxied services, attaches a TCP
//! health check when a port can be inferred, and (cluster mode) attaches the
//! shared managed network. It never touches keys it doesn't own, so unknown
//! top-level and service-level content round-trips untouched.

use crate::error::{ComposeError, Result};
use crate::yaml_util::{container_ports, map_to_value, value_to_map};
use orc_types::routing::RoutingRule;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Label key prefixes purged before new discovery labels are emitted, so
/// repeated rewrites don't accumulate stale routers.
const DISCOVERY_LABEL_PREFIXES: &[&str] =
    &["traefik.http.routers.", "traefik.http.services.", "traefik.enable"];

/// Prefix for the management labels this rewriter owns (`orchestrator.managed`,
/// `orchestrator.deployment_id`, `orchestrator.port`); purged and re-emitted
/// on every pass.
const MANAGED_LABEL_PREFIX: &str = "orchestrator.";

const HEALTHCHECK_INTERVAL: &str = "30s";
const HEALTHCHECK_TIMEOUT: &str = "10s";
const HEALTHCHECK_RETRIES: i64 = 3;
const HEALTHCHECK_START_PERIOD: &str = "40s";

/// `nc -z` with a portable install fallback across apk/apt/yum-based images.
const HEALTHCHECK_SHELL: &str = "nc -z localhost {port} || (apk add --no-cache netcat-openbsd || apt-get install -y netcat-openbsd || yum install -y nc) && nc -z localhost {port}";

#[derive(Debug, Clone)]
pub struct RewriteOptions {
    pub deployment_id: String,
    pub cluster_mode: bool,
    /// Runtime-qualified network name used in cluster mode's `external: true, name: ...`.
    pub managed_network_name: String,
    /// Deployment's declared port, used as priority-4 fallback in port resolution.
    pub declared_port: Option<u16>,
}

/// Routing rules for one service, already in the document's declared order
/// (the caller is responsible for ordering by `index`).
pub type RulesByService = HashMap<String, Vec<RoutingRule>>;

/// Rewrites `doc` in place (functionally — returns a new `Value`), applying
/// the six orchestrator transformations: network attachment, label
/// injection, service-level identity, healthcheck defaults, restart policy,
/// and port/routing bookkeeping. `rules` maps service name to its ordered
/// routing rules; a deployment-wide default-rule insertion happens upstream
/// in the deploy manager, not here.
pub fn rewrite(doc: Value, rules: &RulesByService, opts: &RewriteOptions) -> Result<Value> {
    let mut root = match doc {
        Value::Mapping(m) => m,
        _ => return Err(ComposeError::NotAMapping),
    };

    let services_key = Value::String("services".to_string());
    let mut services = match root.remove(&services_key) {
        Some(Value::Mapping(m)) => m,
        Some(_) => return Err(ComposeError::NotAMapping),
        None => Mapping::new(),
    };

    let service_names: Vec<String> =
        services.keys().filter_map(|k| k.as_str().map(str::to_string)).collect();

    for service_name in &service_names {
        let key = Value::String(service_name.clone());
        let service_value = services.get_mut(&key).expect("key came from this mapping");
        let service = match service_value {
            Value::Mapping(m) => m,
            _ => return Err(ComposeError::ServiceNotAMapping(service_name.clone())),
        };

        let empty = Vec::new();
        let service_rules = rules.get(service_name.as_str()).unwrap_or(&empty);
        rewrite_service(service, service_name, service_rules, rules, opts)?;
    }

    if opts.cluster_mode {
        for name in &service_names {
            let key = Value::String(name.clone());
            if let Some(Value::Mapping(service)) = services.get_mut(&key) {
                attach_service_network(service, &opts.managed_network_name);
            }
        }
        insert_managed_network_definition(&mut root, &opts.managed_network_name);
    }

    root.insert(services_key, Value::Mapping(services));
    Ok(Value::Mapping(root))
}

fn rewrite_service(
    service: &mut Mapping,
    service_name: &str,
    service_rules: &[RoutingRule],
    all_rules: &RulesByService,
    opts: &RewriteOptions,
) -> Result<()> {
    let labels_key = Value::String("labels".to_string());
    let mut labels = value_to_map(service.get(&labels_key));
    purge_managed_labels(&mut labels);

    let has_discovery = !service_rules.is_empty();
    if has_discovery {
        emit_discovery_labels(&mut labels, service_name, service_rules, opts);
    }

    // Resolved ahead of the ports->expose conversion below, per the same
    // priority `maybe_inject_healthcheck` uses, so the registration loop can
    // read the port back off the container's labels instead of re-deriving
    // it from the rewritten document.
    let resolved_port = resolve_port(service, service_name, service_rules, all_rules, opts);

    labels.insert(format!("{MANAGED_LABEL_PREFIX}managed"), "true".to_string());
    labels.insert(format!("{MANAGED_LABEL_PREFIX}deployment_id"), opts.deployment_id.clone());
    if let Some(port) = resolved_port {
        labels.insert(format!("{MANAGED_LABEL_PREFIX}port"), port.to_string());
    }

    if opts.cluster_mode {
        // Labels live under deploy.labels; the service itself keeps only the
        // management labels (not the discovery ones) for inspection.
        service.remove(&labels_key);
        let mut top_level = BTreeMap::new();
        top_level.insert(format!("{MANAGED_LABEL_PREFIX}managed"), "true".to_string());
        top_level.insert(format!("{MANAGED_LABEL_PREFIX}deployment_id"), opts.deployment_id.clone());
        if let Some(port) = resolved_port {
            top_level.insert(format!("{MANAGED_LABEL_PREFIX}port"), port.to_string());
        }
        service.insert(labels_key, map_to_value(&top_level));

        let deploy_key = Value::String("deploy".to_string());
        let mut deploy = match service.remove(&deploy_key) {
            Some(Value::Mapping(m)) => m,
            _ => Mapping::new(),
        };
        deploy.insert(Value::String("labels".to_string()), map_to_value(&labels));
        service.insert(deploy_key, Value::Mapping(deploy));
    } else {
        service.insert(labels_key, map_to_value(&labels));
    }

    if has_discovery {
        expose_instead_of_publish(service);
    }

    maybe_inject_healthcheck(service, service_name, service_rules, all_rules, opts);

    Ok(())
}

fn purge_managed_labels(labels: &mut BTreeMap<String, String>) {
    labels.retain(|k, _| {
        !DISCOVERY_LABEL_PREFIXES.iter().any(|p| k.starts_with(p)) && !k.starts_with(MANAGED_LABEL_PREFIX)
    });
}

fn emit_discovery_labels(
    labels: &mut BTreeMap<String, String>,
    service_name: &str,
    service_rules: &[RoutingRule],
    opts: &RewriteOptions,
) {
    labels.insert("traefik.enable".to_string(), "true".to_string());

    for rule in service_rules {
        let router = router_name(&opts.deployment_id, service_name, rule.index);

        let mut traefik_rule = format!("Host(`{}`)", rule.domain);
        if let Some(prefix) = &rule.path_prefix {
            if !prefix.is_empty() {
                traefik_rule.push_str(&format!(" && PathPrefix(`{prefix}`)"));
            }
        }

        let internal_resolver = rule.cert_resolver_is_internal();
        let use_ssl = rule.resolved_ssl() && !internal_resolver;
        let entrypoint = if use_ssl { "websecure" } else { "web" };

        labels.insert(format!("traefik.http.routers.{router}.rule"), traefik_rule);
        labels.insert(format!("traefik.http.routers.{router}.entrypoints"), entrypoint.to_string());
        labels.insert(format!("traefik.http.routers.{router}.service"), router.clone());

        if use_ssl {
            if let Some(resolver) = &rule.ssl_cert_resolver {
                labels.insert(format!("traefik.http.routers.{router}.tls.certresolver"), resolver.clone());
            } else {
                labels.insert(format!("traefik.http.routers.{router}.tls"), "true".to_string());
            }
        }

        labels.insert(
            format!("traefik.http.services.{router}.loadbalancer.server.port"),
            rule.target_port.to_string(),
        );
    }
}

/// `deployment_id[-serviceName][-index]`: service name is appended unless it
/// is the synthetic `default`/empty name; the index suffix only appears past
/// the first rule so the common single-rule case stays unadorned.
fn router_name(deployment_id: &str, service_name: &str, index: u32) -> String {
    let mut name = deployment_id.to_string();
    if !service_name.is_empty() && service_name != "default" {
        name.push('-');
        name.push_str(service_name);
    }
    if index > 0 {
        name.push('-');
        name.push_str(&index.to_string());
    }
    name
}

fn expose_instead_of_publish(service: &mut Mapping) {
    let ports_key = Value::String("ports".to_string());
    let expose_key = Value::String("expose".to_string());

    let mut container_side = container_ports(service, "ports");
    container_side.extend(container_ports(service, "expose"));
    container_side.sort();
    container_side.dedup();

    service.remove(&ports_key);
    let expose_seq = container_side.into_iter().map(Value::String).collect::<Vec<_>>();
    if expose_seq.is_empty() {
        service.remove(&expose_key);
    } else {
        service.insert(expose_key, Value::Sequence(expose_seq));
    }
}

fn maybe_inject_healthcheck(
    service: &mut Mapping,
    service_name: &str,
    service_rules: &[RoutingRule],
    all_rules: &RulesByService,
    opts: &RewriteOptions,
) {
    let healthcheck_key = Value::String("healthcheck".to_string());
    if service.contains_key(&healthcheck_key) {
        return;
    }

    let port = match resolve_port(service, service_name, service_rules, all_rules, opts) {
        Some(p) => p,
        None => {
            warn!(service = service_name, "no port could be resolved, skipping health check");
            return;
        }
    };

    let command = HEALTHCHECK_SHELL.replace("{port}", &port.to_string());
    let mut healthcheck = Mapping::new();
    healthcheck.insert(
        Value::String("test".to_string()),
        Value::Sequence(vec![
            Value::String("CMD-SHELL".to_string()),
            Value::String(command),
        ]),
    );
    healthcheck.insert(Value::String("interval".to_string()), Value::String(HEALTHCHECK_INTERVAL.to_string()));
    healthcheck.insert(Value::String("timeout".to_string()), Value::String(HEALTHCHECK_TIMEOUT.to_string()));
    healthcheck.insert(Value::String("retries".to_string()), Value::Number(HEALTHCHECK_RETRIES.into()));
    healthcheck
        .insert(Value::String("start_period".to_string()), Value::String(HEALTHCHECK_START_PERIOD.to_string()));

    service.insert(healthcheck_key, Value::Mapping(healthcheck));
}

/// Port-resolution priority, compose-path variant:
/// 1. routing rule for this exact service name
/// 2. a `default`/empty-named rule, when this service is named `default`
/// 3. first routing rule anywhere in the deployment
/// 4. deployment's declared port
/// 5. compose file's first `ports`/`expose` entry
fn resolve_port(
    service: &Mapping,
    service_name: &str,
    service_rules: &[RoutingRule],
    all_rules: &RulesByService,
    opts: &RewriteOptions,
) -> Option<u16> {
    if let Some(rule) = service_rules.first() {
        return Some(rule.target_port);
    }
    if service_name == "default" {
        if let Some(rule) = all_rules.get("default").or_else(|| all_rules.get("")).and_then(|v| v.first()) {
            return Some(rule.target_port);
        }
    }
    let mut service_keys: Vec<&String> = all_rules.keys().collect();
    service_keys.sort();
    if let Some(rule) = service_keys.into_iter().find_map(|k| all_rules.get(k).and_then(|v| v.first())) {
        return Some(rule.target_port);
    }
    if let Some(port) = opts.declared_port {
        return Some(port);
    }
    let mut existing = container_ports(service, "ports");
    existing.extend(container_ports(service, "expose"));
    existing.first().and_then(|p| p.split('/').next()).and_then(|p| p.parse().ok())
}

fn insert_managed_network_definition(root: &mut Mapping, managed_network_name: &str) {
    let networks_key = Value::String("networks".to_string());
    let mut networks = match root.remove(&networks_key) {
        Some(Value::Mapping(m)) => m,
        _ => Mapping::new(),
    };

    let mut network_def = Mapping::new();
    network_def.insert(Value::String("external".to_string()), Value::Bool(true));
    network_def.insert(Value::String("name".to_string()), Value::String(managed_network_name.to_string()));
    networks.insert(Value::String(managed_network_name.to_string()), Value::Mapping(network_def));

    root.insert(networks_key, Value::Mapping(networks));
}

fn attach_service_network(service: &mut Mapping, network_name: &str) {
    let networks_key = Value::String("networks".to_string());
    match service.get_mut(&networks_key) {
        Some(Value::Sequence(seq)) => {
            if !seq.iter().any(|v| v.as_str() == Some(network_name)) {
                seq.push(Value::String(network_name.to_string()));
            }
        }
        Some(Value::Mapping(map)) => {
            let key = Value::String(network_name.to_string());
            if !map.contains_key(&key) {
                map.insert(key, Value::Null);
            }
        }
        _ => {
            service.insert(networks_key, Value::Sequence(vec![Value::String(network_name.to_string())]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_types::routing::RoutingProtocol;

    fn base_doc() -> Value {
        serde_yaml::from_str(
            r#"
services:
  web:
    image: nginx:latest
    ports:
      - "8080:80"
"#,
        )
        .unwrap()
    }

    fn http_rule(deployment_id: &str, index: u32, port: u16) -> RoutingRule {
        RoutingRule::new(deployment_id, "web", index, "app.example.com", port).unwrap()
    }

    fn opts(deployment_id: &str, cluster_mode: bool) -> RewriteOptions {
        RewriteOptions {
            deployment_id: deployment_id.to_string(),
            cluster_mode,
            managed_network_name: "deploy-net".to_string(),
            declared_port: None,
        }
    }

    #[test]
    fn injects_discovery_labels_and_strips_ports() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();

        let service = result["services"]["web"].as_mapping().unwrap();
        assert!(service.get(&Value::String("ports".to_string())).is_none());
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert_eq!(labels.get("traefik.http.routers.dep1.rule"), Some(&"Host(`app.example.com`)".to_string()));
        assert_eq!(labels.get("traefik.http.services.dep1.loadbalancer.server.port"), Some(&"80".to_string()));
        assert_eq!(labels.get("traefik.http.routers.dep1.entrypoints"), Some(&"web".to_string()));
    }

    #[test]
    fn ssl_rule_uses_websecure_entrypoint() {
        let doc = base_doc();
        let mut rule = http_rule("dep1", 0, 80);
        rule.ssl_enabled = true;
        rule.protocol = RoutingProtocol::Https;
        rule.ssl_cert_resolver = Some("letsencrypt".to_string());
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![rule]);

        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert_eq!(labels.get("traefik.http.routers.dep1.entrypoints"), Some(&"websecure".to_string()));
        assert_eq!(labels.get("traefik.http.routers.dep1.tls.certresolver"), Some(&"letsencrypt".to_string()));
    }

    #[test]
    fn internal_resolver_forces_web_entrypoint() {
        let doc = base_doc();
        let mut rule = http_rule("dep1", 0, 80);
        rule.protocol = RoutingProtocol::Https;
        rule.ssl_cert_resolver = Some("internal".to_string());
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![rule]);

        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert_eq!(labels.get("traefik.http.routers.dep1.entrypoints"), Some(&"web".to_string()));
        assert!(!labels.contains_key("traefik.http.routers.dep1.tls.certresolver"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let once = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let twice = rewrite(once.clone(), &rules, &opts("dep1", false)).unwrap();
        assert_eq!(serde_yaml::to_string(&once).unwrap(), serde_yaml::to_string(&twice).unwrap());
    }

    #[test]
    fn orchestrator_port_label_reflects_resolved_port() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert_eq!(labels.get("orchestrator.port"), Some(&"80".to_string()));
    }

    #[test]
    fn orchestrator_port_label_present_under_deploy_labels_in_cluster_mode() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let result = rewrite(doc, &rules, &opts("dep1", true)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();

        let top_labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert_eq!(top_labels.get("orchestrator.port"), Some(&"80".to_string()));

        let deploy = service.get(&Value::String("deploy".to_string())).unwrap().as_mapping().unwrap();
        let deploy_labels = value_to_map(deploy.get(&Value::String("labels".to_string())));
        assert_eq!(deploy_labels.get("orchestrator.port"), Some(&"80".to_string()));
    }

    #[test]
    fn no_resolvable_port_means_no_orchestrator_port_label() {
        let doc: Value = serde_yaml::from_str(
            r#"
services:
  worker:
    image: worker:latest
"#,
        )
        .unwrap();
        let rules = RulesByService::new();
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["worker"].as_mapping().unwrap();
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert!(!labels.contains_key("orchestrator.port"));
    }

    #[test]
    fn health_check_injected_when_port_resolvable() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();
        assert!(service.contains_key(&Value::String("healthcheck".to_string())));
    }

    #[test]
    fn no_rules_leaves_ports_and_skips_discovery() {
        let doc = base_doc();
        let rules = RulesByService::new();
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        let service = result["services"]["web"].as_mapping().unwrap();
        assert!(service.contains_key(&Value::String("ports".to_string())));
        let labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert!(!labels.contains_key("traefik.enable"));
    }

    #[test]
    fn cluster_mode_places_labels_under_deploy_and_attaches_network() {
        let doc = base_doc();
        let mut rules = RulesByService::new();
        rules.insert("web".to_string(), vec![http_rule("dep1", 0, 80)]);
        let result = rewrite(doc, &rules, &opts("dep1", true)).unwrap();

        let service = result["services"]["web"].as_mapping().unwrap();
        let top_labels = value_to_map(service.get(&Value::String("labels".to_string())));
        assert!(!top_labels.contains_key("traefik.enable"));
        assert_eq!(top_labels.get("orchestrator.managed"), Some(&"true".to_string()));

        let deploy = service.get(&Value::String("deploy".to_string())).unwrap().as_mapping().unwrap();
        let deploy_labels = value_to_map(deploy.get(&Value::String("labels".to_string())));
        assert_eq!(deploy_labels.get("traefik.enable"), Some(&"true".to_string()));

        let networks = service.get(&Value::String("networks".to_string())).unwrap();
        assert!(networks.as_sequence().unwrap().iter().any(|v| v.as_str() == Some("deploy-net")));

        let top_networks = result["networks"]["deploy-net"].as_mapping().unwrap();
        assert_eq!(top_networks.get(&Value::String("external".to_string())).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn unknown_top_level_keys_round_trip() {
        let doc: Value = serde_yaml::from_str(
            r#"
version: "3.8"
services:
  web:
    image: nginx:latest
volumes:
  data: {}
"#,
        )
        .unwrap();
        let rules = RulesByService::new();
        let result = rewrite(doc, &rules, &opts("dep1", false)).unwrap();
        assert_eq!(result["version"].as_str(), Some("3.8"));
        assert!(result.get("volumes").is_some());
    }
}
