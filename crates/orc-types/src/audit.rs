//! `AuditEntry` — append-only log of system-initiated actions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AuditAction {
    SeedSshKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor: String,
    pub action: AuditAction,
    pub detail: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Identity used for system-initiated audit entries (e.g. SSH-key seeding),
/// as opposed to a human operator's user id.
pub const SYSTEM_ACTOR: &str = "system";

impl AuditEntry {
    /// A `SeedSshKey` entry for a newly-imported key found on the hypervisor
    /// during `orc_hypervisor::ssh_sync::seed`.
    pub fn seed_ssh_key(organization_id: impl Into<String>, vps_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actor: SYSTEM_ACTOR.to_string(),
            action: AuditAction::SeedSshKey,
            detail: format!("org={} vps={}", organization_id.into(), vps_id.into()),
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_ssh_key_records_system_actor_and_scope() {
        let entry = AuditEntry::seed_ssh_key("org1", "vps1");
        assert_eq!(entry.actor, SYSTEM_ACTOR);
        assert_eq!(entry.action, AuditAction::SeedSshKey);
        assert!(entry.detail.contains("org1"));
        assert!(entry.detail.contains("vps1"));
    }
}
