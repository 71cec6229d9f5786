//! Storage pool kind classification — the disk-spec
//! syntax differs entirely between the two families.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoragePoolKind {
    /// dir, nfs, cifs, glusterfs, directory
    DirectoryLike,
    /// lvm, lvm-thin, zfs, zfspool, and anything unrecognized
    BlockLike,
}

const DIRECTORY_LIKE_TYPES: &[&str] = &["dir", "nfs", "cifs", "glusterfs", "directory"];

pub fn classify(storage_type: &str) -> StoragePoolKind {
    if DIRECTORY_LIKE_TYPES.contains(&storage_type) {
        StoragePoolKind::DirectoryLike
    } else {
        StoragePoolKind::BlockLike
    }
}

/// Builds the disk-spec string for creating or resizing a boot disk.
/// Directory-like storage addresses the volume as a qcow2 file under the
/// vmid subdirectory; block-like storage addresses it as a bare volume name
/// with no `format=`.
pub fn disk_spec(kind: StoragePoolKind, pool: &str, vmid: u32, disk_gib: u64) -> String {
    match kind {
        StoragePoolKind::DirectoryLike => {
            format!("{pool}:{vmid}/vm-{vmid}-disk-0.qcow2,size={disk_gib}G,format=qcow2")
        }
        StoragePoolKind::BlockLike => format!("{pool}:vm-{vmid}-disk-0,size={disk_gib}G"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_directory_like_types() {
        for t in DIRECTORY_LIKE_TYPES {
            assert_eq!(classify(t), StoragePoolKind::DirectoryLike);
        }
    }

    #[test]
    fn classifies_unknown_as_block_like() {
        assert_eq!(classify("zfspool"), StoragePoolKind::BlockLike);
        assert_eq!(classify("some-future-backend"), StoragePoolKind::BlockLike);
    }

    #[test]
    fn directory_like_disk_spec_has_qcow2_format() {
        let spec = disk_spec(StoragePoolKind::DirectoryLike, "local", 101, 20);
        assert_eq!(spec, "local:101/vm-101-disk-0.qcow2,size=20G,format=qcow2");
    }

    #[test]
    fn block_like_disk_spec_has_no_format() {
        let spec = disk_spec(StoragePoolKind::BlockLike, "local-lvm", 101, 20);
        assert_eq!(spec, "local-lvm:vm-101-disk-0,size=20G");
        assert!(!spec.contains("format="));
    }
}
