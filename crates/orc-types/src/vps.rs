//! `VPS` — the control plane's record of a hypervisor-managed virtual
//! machine. The hypervisor-side VM name always equals `vps_id`; this is the
//! sole fingerprint used to refuse destructive operations on VMs the
//! controller did not create.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VpsFlavor {
    pub cpu_cores: u32,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

impl VpsFlavor {
    pub fn disk_gib(&self) -> u64 {
        // round to nearest GiB, matching the hypervisor's resize semantics
        (self.disk_bytes + (1 << 30) / 2) / (1 << 30)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ImageSelector {
    Ubuntu2204,
    Ubuntu2404,
    Debian12,
    Custom(String),
}

impl ImageSelector {
    /// Name of the cloud-init template this selector maps to, if one is
    /// known; `None` routes VM creation to the ISO-boot-from-scratch path.
    pub fn template_name(&self) -> Option<&str> {
        match self {
            ImageSelector::Ubuntu2204 => Some("ubuntu-2204-cloudinit"),
            ImageSelector::Ubuntu2404 => Some("ubuntu-2404-cloudinit"),
            ImageSelector::Debian12 => Some("debian-12-cloudinit"),
            ImageSelector::Custom(name) => Some(name.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vps {
    pub vps_id: String,
    pub display_name: String,
    pub organization_id: String,
    pub flavor: VpsFlavor,
    pub image: ImageSelector,
}

impl Vps {
    pub fn new(
        vps_id: impl Into<String>,
        display_name: impl Into<String>,
        organization_id: impl Into<String>,
        flavor: VpsFlavor,
        image: ImageSelector,
    ) -> Result<Self> {
        let vps = Self {
            vps_id: vps_id.into(),
            display_name: display_name.into(),
            organization_id: organization_id.into(),
            flavor,
            image,
        };
        vps.validate()?;
        Ok(vps)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vps_id.trim().is_empty() {
            return Err(CommonError::Validation("vps_id must not be empty".into()));
        }
        if self.flavor.cpu_cores == 0 {
            return Err(CommonError::Validation("cpu_cores must be > 0".into()));
        }
        if self.flavor.memory_bytes == 0 || self.flavor.disk_bytes == 0 {
            return Err(CommonError::Validation("memory_bytes and disk_bytes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_gib_rounds_to_nearest() {
        let flavor = VpsFlavor { cpu_cores: 2, memory_bytes: 1 << 30, disk_bytes: 21_500_000_000 };
        assert_eq!(flavor.disk_gib(), 20);
    }

    #[test]
    fn custom_image_keeps_its_name_as_template() {
        let selector = ImageSelector::Custom("my-golden-image".into());
        assert_eq!(selector.template_name(), Some("my-golden-image"));
    }
}
