//! `RoutingRule` — the authoritative declaration of how traffic for a
//! service is addressed (domain, path, port, TLS).

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProtocol {
    Http,
    Https,
    Grpc,
    Tcp,
}

/// The special `ssl_cert_resolver` value that downgrades a rule to a
/// plaintext entrypoint.
pub const CERT_RESOLVER_INTERNAL: &str = "internal";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub deployment_id: String,
    pub service_name: String,
    pub index: u32,
    pub domain: String,
    pub path_prefix: Option<String>,
    pub target_port: u16,
    pub protocol: RoutingProtocol,
    pub ssl_enabled: bool,
    pub ssl_cert_resolver: Option<String>,
    pub middleware: serde_json::Value,
}

impl RoutingRule {
    pub fn new(
        deployment_id: impl Into<String>,
        service_name: impl Into<String>,
        index: u32,
        domain: impl Into<String>,
        target_port: u16,
    ) -> Result<Self> {
        let rule = Self {
            deployment_id: deployment_id.into(),
            service_name: service_name.into(),
            index,
            domain: domain.into(),
            path_prefix: None,
            target_port,
            protocol: RoutingProtocol::Http,
            ssl_enabled: false,
            ssl_cert_resolver: None,
            middleware: serde_json::Value::Null,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_port == 0 {
            return Err(CommonError::Validation("target_port must be in 1..=65535".into()));
        }
        Ok(())
    }

    /// Whether this rule should use SSL, taking protocol overrides into
    /// account: `protocol=https` forces SSL, `protocol=http` forbids it,
    /// otherwise `ssl_enabled` decides.
    pub fn resolved_ssl(&self) -> bool {
        match self.protocol {
            RoutingProtocol::Https => true,
            RoutingProtocol::Http => false,
            RoutingProtocol::Grpc | RoutingProtocol::Tcp => self.ssl_enabled,
        }
    }

    /// Whether the cert resolver should be omitted (forcing the `web`
    /// entrypoint even when SSL is otherwise on).
    pub fn cert_resolver_is_internal(&self) -> bool {
        self.ssl_cert_resolver.as_deref() == Some(CERT_RESOLVER_INTERNAL)
    }
}

/// Identity for a routing rule: `(deployment_id, service_name, index)`.
pub type RoutingRuleKey = (String, String, u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_protocol_forces_ssl_regardless_of_flag() {
        let mut rule = RoutingRule::new("d1", "api", 0, "d1.example", 3000).unwrap();
        rule.protocol = RoutingProtocol::Https;
        rule.ssl_enabled = false;
        assert!(rule.resolved_ssl());
    }

    #[test]
    fn http_protocol_forbids_ssl_even_if_flagged() {
        let mut rule = RoutingRule::new("d1", "api", 0, "d1.example", 3000).unwrap();
        rule.protocol = RoutingProtocol::Http;
        rule.ssl_enabled = true;
        assert!(!rule.resolved_ssl());
    }

    #[test]
    fn internal_resolver_is_detected() {
        let mut rule = RoutingRule::new("d1", "api", 0, "d1.example", 3000).unwrap();
        rule.ssl_cert_resolver = Some("internal".to_string());
        assert!(rule.cert_resolver_is_internal());
    }

    #[test]
    fn rejects_zero_port() {
        assert!(RoutingRule::new("d1", "api", 0, "d1.example", 0).is_err());
    }
}
