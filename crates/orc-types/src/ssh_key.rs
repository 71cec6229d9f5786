//! `SSHKey` — reconciled against the hypervisor, which is the source of
//! truth (see orc-hypervisor's ssh_sync module).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    pub key_id: String,
    pub organization_id: String,
    /// `None` means an org-wide key, applied to every VPS in the org.
    pub vps_id: Option<String>,
    pub name: String,
    /// Single-line OpenSSH public key.
    pub public_key: String,
    /// SHA-256 fingerprint, lowercase hex.
    pub fingerprint: String,
}

impl SshKey {
    /// Uniqueness scope: `(organization_id, fingerprint, vps_id-or-null)`.
    pub fn scope_key(&self) -> (String, String, Option<String>) {
        (self.organization_id.clone(), self.fingerprint.clone(), self.vps_id.clone())
    }

    pub fn is_org_wide(&self) -> bool {
        self.vps_id.is_none()
    }
}
