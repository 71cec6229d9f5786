//! SSH-key reconciliation with the hypervisor as source of truth. Two
//! operations: `seed` absorbs whatever the hypervisor reports into the DB;
//! `update` pushes the DB's view back out.

use crate::client::HypervisorClient;
use crate::cloudinit::{double_encode, format_ssh_keys};
use crate::error::{HypervisorError, Result};
use orc_persistence::{AuditRepository, SshKeyRepository};
use orc_types::audit::AuditEntry;
use orc_types::ssh_key::SshKey;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::warn;

fn fingerprint(key_material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_material.as_bytes());
    hex::encode(hasher.finalize())
}

/// `(type, key_material, comment)`. `key_material` is `type + base64 data`
/// (the part the fingerprint is computed over); the comment is purely
/// cosmetic naming input.
fn parse_key_line(line: &str) -> Option<(String, String, Option<String>)> {
    let mut fields = line.split_whitespace();
    let key_type = fields.next()?;
    let key_data = fields.next()?;
    let comment: Vec<&str> = fields.collect();
    let comment = if comment.is_empty() { None } else { Some(comment.join(" ")) };
    Some((key_type.to_string(), format!("{key_type} {key_data}"), comment))
}

/// Given the hypervisor's raw `sshkeys` blob for a VM, reconciles the DB's
/// view of `(org, vps_id)` to match it exactly.
pub async fn seed(
    raw_blob: &str,
    organization_id: &str,
    vps_id: &str,
    repository: &dyn SshKeyRepository,
    audit: &dyn AuditRepository,
) -> Result<()> {
    let decoded = urlencoding::decode(raw_blob).map(|c| c.into_owned()).unwrap_or_else(|_| raw_blob.to_string());

    let mut present = HashSet::new();
    for line in decoded.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((_key_type, key_material, comment)) = parse_key_line(trimmed) else {
            continue;
        };

        let fp = fingerprint(&key_material);
        present.insert(fp.clone());

        match repository.find_by_fingerprint(organization_id, &fp, Some(vps_id)).await? {
            Some(mut existing) => {
                if !existing.is_org_wide() {
                    if let Some(comment) = &comment {
                        existing.name = comment.clone();
                    }
                    repository.upsert(existing).await?;
                }
                // org-wide rows are never renamed from a vps-scoped seed.
            }
            None => {
                let name = match &comment {
                    Some(c) => format!("Imported: {c}"),
                    None => "Imported from Proxmox".to_string(),
                };
                let key = SshKey {
                    key_id: uuid::Uuid::new_v4().to_string(),
                    organization_id: organization_id.to_string(),
                    vps_id: Some(vps_id.to_string()),
                    name,
                    public_key: trimmed.to_string(),
                    fingerprint: fp,
                };
                repository.upsert(key).await?;
                if let Err(e) = audit.append(AuditEntry::seed_ssh_key(organization_id, vps_id)).await {
                    warn!(error = %e, "audit log write failed for SeedSshKey, continuing");
                }
            }
        }
    }

    for existing in repository.list_for_scope(organization_id, Some(vps_id)).await? {
        if !present.contains(&existing.fingerprint) {
            repository.delete(&existing.key_id).await?;
        }
    }

    Ok(())
}

/// Serializes the DB's current key set for `(org, vps_id)` into the raw
/// form the hypervisor expects, deduplicating by fingerprint (VPS-scoped
/// keys win over org-wide ones when both are present) and excluding one key
/// id (used mid-deletion by the caller).
pub async fn serialize_for_push(
    organization_id: &str,
    vps_id: &str,
    exclude_key_id: Option<&str>,
    repository: &dyn SshKeyRepository,
) -> Result<String> {
    let org_wide = repository.list_for_scope(organization_id, None).await?;
    let vps_scoped = repository.list_for_scope(organization_id, Some(vps_id)).await?;

    let mut by_fingerprint: HashMap<String, SshKey> = HashMap::new();
    for key in org_wide.into_iter().chain(vps_scoped.into_iter()) {
        if Some(key.key_id.as_str()) == exclude_key_id {
            continue;
        }
        // insertion order (org-wide first, vps-scoped second) means a
        // later vps-scoped entry naturally overwrites an org-wide one.
        by_fingerprint.insert(key.fingerprint.clone(), key);
    }

    let mut keys: Vec<SshKey> = by_fingerprint.into_values().collect();
    keys.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    let lines: Vec<String> = keys
        .iter()
        .map(|k| {
            let has_comment = k.public_key.split_whitespace().count() > 2;
            if has_comment {
                k.public_key.clone()
            } else {
                format!("{} {}", k.public_key, k.name)
            }
        })
        .collect();

    Ok(format_ssh_keys(lines.iter().map(String::as_str)))
}

/// Double-URL-encodes the serialized key set for the PUT body.
pub fn encode_for_push(serialized: &str) -> String {
    double_encode(serialized)
}

/// Full Update flow: serialize the DB's current view (minus any excluded
/// key), push it, then re-read the hypervisor and verify its fingerprint set
/// matches exactly. A mismatch is surfaced as an error — the caller decides
/// whether to retry or report the failure.
pub async fn update(
    client: &HypervisorClient,
    node: &str,
    vmid: u32,
    organization_id: &str,
    vps_id: &str,
    exclude_key_id: Option<&str>,
    repository: &dyn SshKeyRepository,
) -> Result<()> {
    let serialized = serialize_for_push(organization_id, vps_id, exclude_key_id, repository).await?;
    client.push_ssh_keys(node, vmid, &serialized).await?;

    let expected: HashSet<String> = serialized
        .split('\n')
        .filter(|l| !l.is_empty())
        .filter_map(|l| parse_key_line(l).map(|(_, material, _)| fingerprint(&material)))
        .collect();

    let raw = client.read_ssh_keys(node, vmid).await?;
    let decoded = urlencoding::decode(&raw).map(|c| c.into_owned()).unwrap_or(raw);
    let actual: HashSet<String> = decoded
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| parse_key_line(l).map(|(_, material, _)| fingerprint(&material)))
        .collect();

    let leftover = actual.difference(&expected).count();
    if leftover > 0 {
        return Err(HypervisorError::SshKeySyncIncomplete(leftover));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_persistence::InMemoryGateway;

    #[test]
    fn parses_type_data_and_comment() {
        let (key_type, material, comment) = parse_key_line("ssh-ed25519 AAAABBBB user@host").unwrap();
        assert_eq!(key_type, "ssh-ed25519");
        assert_eq!(material, "ssh-ed25519 AAAABBBB");
        assert_eq!(comment, Some("user@host".to_string()));
    }

    #[test]
    fn rejects_line_with_only_one_field() {
        assert!(parse_key_line("ssh-ed25519").is_none());
    }

    #[tokio::test]
    async fn seed_inserts_new_keys_and_deletes_absent_ones() {
        let gateway = InMemoryGateway::new();
        let existing = SshKey {
            key_id: "old-1".to_string(),
            organization_id: "org1".to_string(),
            vps_id: Some("vps1".to_string()),
            name: "stale".to_string(),
            public_key: "ssh-ed25519 STALE stale@host".to_string(),
            fingerprint: fingerprint("ssh-ed25519 STALE"),
        };
        gateway.upsert(existing).await.unwrap();

        let blob = "ssh-ed25519 FRESH fresh@host\n";
        seed(blob, "org1", "vps1", &gateway, &gateway).await.unwrap();

        let keys = gateway.list_for_scope("org1", Some("vps1")).await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fingerprint, fingerprint("ssh-ed25519 FRESH"));
        assert_eq!(keys[0].name, "Imported: fresh@host");
    }

    #[tokio::test]
    async fn seed_handles_url_encoded_blob() {
        let gateway = InMemoryGateway::new();
        let raw = "ssh-ed25519 AAAA user@host";
        let encoded = urlencoding::encode(raw).into_owned();
        seed(&encoded, "org1", "vps1", &gateway, &gateway).await.unwrap();
        let keys = gateway.list_for_scope("org1", Some("vps1")).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn serialize_prefers_vps_scoped_over_org_wide_on_fingerprint_collision() {
        let gateway = InMemoryGateway::new();
        let fp = fingerprint("ssh-ed25519 SHARED");
        let org_wide = SshKey {
            key_id: "k1".to_string(),
            organization_id: "org1".to_string(),
            vps_id: None,
            name: "org-wide".to_string(),
            public_key: "ssh-ed25519 SHARED org-wide".to_string(),
            fingerprint: fp.clone(),
        };
        let vps_scoped = SshKey {
            key_id: "k2".to_string(),
            organization_id: "org1".to_string(),
            vps_id: Some("vps1".to_string()),
            name: "vps-scoped".to_string(),
            public_key: "ssh-ed25519 SHARED vps-scoped".to_string(),
            fingerprint: fp,
        };
        gateway.upsert(org_wide).await.unwrap();
        gateway.upsert(vps_scoped).await.unwrap();

        let serialized = serialize_for_push("org1", "vps1", None, &gateway).await.unwrap();
        assert!(serialized.contains("vps-scoped"));
        assert!(!serialized.contains("org-wide"));
    }

    #[tokio::test]
    async fn serialize_excludes_given_key_id() {
        let gateway = InMemoryGateway::new();
        let key = SshKey {
            key_id: "k1".to_string(),
            organization_id: "org1".to_string(),
            vps_id: Some("vps1".to_string()),
            name: "only".to_string(),
            public_key: "ssh-ed25519 ONLY only@host".to_string(),
            fingerprint: fingerprint("ssh-ed25519 ONLY"),
        };
        gateway.upsert(key).await.unwrap();
        let serialized = serialize_for_push("org1", "vps1", Some("k1"), &gateway).await.unwrap();
        assert_eq!(serialized, "");
    }
}
