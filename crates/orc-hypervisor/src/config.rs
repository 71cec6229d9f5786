//! Hypervisor client configuration, populated from the config layer
//! (`<APP>_STORAGE_POOL`, `<APP>_VLAN_ID`, `<APP>_VM_ID_START`).

#[derive(Debug, Clone)]
pub struct HypervisorConfig {
    pub base_url: String,
    pub storage_pool: String,
    pub vlan_id: Option<u32>,
    /// When set, VM-id allocation scans for the lowest free id at or above
    /// this value instead of calling the hypervisor's "next id" endpoint.
    pub vm_id_start: Option<u32>,
    /// TLS verification is disabled by default (self-signed hypervisor
    /// certificates are common); set true to require a valid certificate
    /// chain.
    pub verify_tls: bool,
    pub request_timeout_secs: u64,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8006/api2/json".to_string(),
            storage_pool: "local".to_string(),
            vlan_id: None,
            vm_id_start: None,
            verify_tls: false,
            request_timeout_secs: 30,
        }
    }
}
