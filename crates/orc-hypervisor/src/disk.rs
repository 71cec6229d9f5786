//! Shared disk-identification subroutine, used by both the clone path (to
//! find whether a template already has a boot disk) and the from-scratch
//! path (to find a just-created one in storage content).

use serde::Deserialize;
use serde_json::Value;

/// Priority order in which boot-disk slots are checked.
const DISK_KEYS: &[&str] = &["scsi0", "virtio0", "sata0", "ide0"];

/// Returns the active boot-disk key for a VM config map, biasing the search
/// toward `prefer` (the key the template's disk was identified under, if
/// known) when present.
pub fn find_boot_disk_key(config: &Value, prefer: Option<&str>) -> Option<String> {
    let object = config.as_object()?;

    if let Some(key) = prefer {
        if let Some(value) = object.get(key) {
            if is_boot_disk(value) {
                return Some(key.to_string());
            }
        }
    }

    DISK_KEYS.iter().find_map(|key| {
        object.get(*key).filter(|v| is_boot_disk(v)).map(|_| key.to_string())
    })
}

/// A disk slot is not a boot disk if it's the cloud-init drive.
fn is_boot_disk(value: &Value) -> bool {
    match value.as_str() {
        Some(s) => !s.contains("cloudinit"),
        None => false,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageContentEntry {
    pub content: String,
    pub vmid: Option<u32>,
    pub volid: String,
}

/// Locates a just-cloned disk by scanning a storage pool's content listing:
/// matches entries with `content=images`, the target vmid, and a volume id
/// that doesn't reference cloud-init.
pub fn find_disk_in_content<'a>(entries: &'a [StorageContentEntry], target_vmid: u32) -> Option<&'a StorageContentEntry> {
    entries
        .iter()
        .find(|e| e.content == "images" && e.vmid == Some(target_vmid) && !e.volid.contains("cloudinit"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_scsi0_before_virtio0() {
        let config = json!({"scsi0": "local:vm-100-disk-0,size=20G", "virtio0": "local:vm-100-disk-1,size=20G"});
        assert_eq!(find_boot_disk_key(&config, None), Some("scsi0".to_string()));
    }

    #[test]
    fn skips_cloudinit_only_disk() {
        let config = json!({"ide2": "local:vm-100-cloudinit,media=cdrom"});
        assert_eq!(find_boot_disk_key(&config, None), None);
    }

    #[test]
    fn falls_back_to_lower_priority_key() {
        let config = json!({"sata0": "local:vm-100-disk-0,size=20G"});
        assert_eq!(find_boot_disk_key(&config, None), Some("sata0".to_string()));
    }

    #[test]
    fn finds_disk_by_vmid_and_images_content() {
        let entries = vec![
            StorageContentEntry { content: "iso".to_string(), vmid: None, volid: "local:iso/ubuntu.iso".to_string() },
            StorageContentEntry { content: "images".to_string(), vmid: Some(100), volid: "local:100/vm-100-disk-0.qcow2".to_string() },
        ];
        let found = find_disk_in_content(&entries, 100).unwrap();
        assert_eq!(found.volid, "local:100/vm-100-disk-0.qcow2");
    }
}
