//! Per-VM firewall scaffolding. Enabling the firewall and, when isolation is
//! requested, adding an inbound REJECT rule on the bridge interface are the
//! only rules actually applied; org-scope peering only records intent — no
//! rule is synthesized for it yet.

use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct FirewallIntent {
    pub isolate: bool,
    /// Recorded but not translated into a rule (see module docs).
    pub allow_inter_vm: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallRulePayload {
    pub action: String,
    pub r#type: String,
    pub iface: String,
    pub comment: String,
}

/// Builds the REJECT rule payload for isolation. Caller POSTs this to
/// `/nodes/{n}/qemu/{id}/firewall/rules`.
pub fn isolation_reject_rule(bridge_iface: &str) -> FirewallRulePayload {
    FirewallRulePayload {
        action: "REJECT".to_string(),
        r#type: "in".to_string(),
        iface: bridge_iface.to_string(),
        comment: "orchestrator: inbound isolation".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_rule_rejects_inbound_on_given_iface() {
        let rule = isolation_reject_rule("vmbr0");
        assert_eq!(rule.action, "REJECT");
        assert_eq!(rule.r#type, "in");
        assert_eq!(rule.iface, "vmbr0");
    }
}
