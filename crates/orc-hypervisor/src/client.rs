//! The Hypervisor Client proper: ties `auth`, `id_alloc`, `storage`, `disk`,
//! `cloudinit`, `firewall`, and `terminal` together into the VM lifecycle
//! operations. Everything else in this crate is a pure or narrowly-scoped
//! helper; this module is where the fixed ordering — allocate id, validate
//! storage, clone or create, ensure the boot disk, resize, write cloud-init,
//! configure the firewall, start — actually happens.

use crate::auth::{AuthMode, HypervisorAuth};
use crate::cloudinit::{double_encode, format_ssh_keys, generate_password, ENCODING_DEPTH};
use crate::config::HypervisorConfig;
use crate::disk::{find_boot_disk_key, find_disk_in_content, StorageContentEntry};
use crate::error::{HypervisorError, Result};
use crate::firewall::{isolation_reject_rule, FirewallIntent};
use crate::id_alloc::lowest_free_id;
use crate::storage::{classify, disk_spec, StoragePoolKind};
use crate::terminal::{parse_port, serial_console_url, termproxy_user, vnc_websocket_url};
use orc_types::vps::Vps;
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const FORCE_STOP_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const FORCE_STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cloud-init credentials generated during VM creation. The password is
/// returned once to the caller; this client never persists it.
#[derive(Debug, Clone)]
pub struct ProvisionedCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CreatedVm {
    pub vmid: u32,
    pub node: String,
    pub disk_key: String,
    pub credentials: ProvisionedCredentials,
}

pub struct HypervisorClient {
    http: Client,
    auth: HypervisorAuth,
    config: HypervisorConfig,
}

impl HypervisorClient {
    pub fn new(config: HypervisorConfig, mode: AuthMode) -> Result<Self> {
        // Explicit builder, not `Client::new()`: TLS verification is
        // disabled by default: self-signed hypervisor certs are the common case.
        let http = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let auth = HypervisorAuth::new(mode, config.base_url.clone());
        Ok(Self { http, auth, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn unwrap_data(endpoint: &str, response: Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(HypervisorError::RequestFailed { endpoint: endpoint.to_string(), message: body.to_string() });
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let builder = self.auth.apply(&self.http, self.http.get(self.url(path)), false).await?;
        Self::unwrap_data(path, builder.send().await?).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let builder = self.auth.apply(&self.http, self.http.post(self.url(path)).form(form), true).await?;
        Self::unwrap_data(path, builder.send().await?).await
    }

    async fn put_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value> {
        let builder = self.auth.apply(&self.http, self.http.put(self.url(path)).form(form), true).await?;
        Self::unwrap_data(path, builder.send().await?).await
    }

    // ---- step 1: VM id allocation -----------------------------------

    /// Either the hypervisor's own `/cluster/nextid`, or — when a start-id
    /// is configured — the lowest free id across every node's VM list at or
    /// above it, scanning every node's VM list so ids stay unique cluster-wide.
    #[instrument(skip(self))]
    pub async fn allocate_vm_id(&self) -> Result<u32> {
        match self.config.vm_id_start {
            None => {
                let data = self.get("/cluster/nextid").await?;
                data.as_str()
                    .and_then(|s| s.parse::<u32>().ok())
                    .or_else(|| data.as_u64().map(|n| n as u32))
                    .ok_or_else(|| HypervisorError::UnexpectedResponse {
                        endpoint: "/cluster/nextid".into(),
                        message: format!("unparseable nextid response: {data:?}"),
                    })
            }
            Some(start) => {
                let mut used = HashSet::new();
                for node in self.list_nodes().await? {
                    for vm in self.list_vms(&node).await? {
                        if let Some(id) = vm.get("vmid").and_then(Value::as_u64) {
                            used.insert(id as u32);
                        }
                    }
                }
                lowest_free_id(&used, start)
            }
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<String>> {
        let data = self.get("/nodes").await?;
        Ok(data
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|n| n.get("node").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    pub async fn list_vms(&self, node: &str) -> Result<Vec<Value>> {
        let data = self.get(&format!("/nodes/{node}/qemu")).await?;
        Ok(data.as_array().cloned().unwrap_or_default())
    }

    // ---- step 2/3: node + storage -----------------------------------

    /// Confirms `pool` exists on `node` and classifies its storage kind.
    #[instrument(skip(self))]
    pub async fn validate_storage(&self, node: &str, pool: &str) -> Result<StoragePoolKind> {
        let data = self.get(&format!("/nodes/{node}/storage")).await?;
        let storage_type = data
            .as_array()
            .into_iter()
            .flatten()
            .find(|s| s.get("storage").and_then(Value::as_str) == Some(pool))
            .and_then(|s| s.get("type").and_then(Value::as_str))
            .ok_or_else(|| HypervisorError::StorageNotFound(pool.to_string(), node.to_string()))?;
        Ok(classify(storage_type))
    }

    // ---- VM creation ---------------------------------------------------

    /// Orchestrates the full VM creation algorithm: allocate id, pick a
    /// node, clone from template or create from an ISO, ensure a boot disk,
    /// resize it to the flavor's plan, write cloud-init, configure the
    /// firewall, and start. Every step runs in this fixed order.
    #[instrument(skip(self, vps, ssh_public_keys), fields(vps_id = %vps.vps_id))]
    pub async fn create_vm(
        &self,
        vps: &Vps,
        ssh_public_keys: &[String],
        firewall: FirewallIntent,
    ) -> Result<CreatedVm> {
        let vmid = self.allocate_vm_id().await?;
        // Node selection is pluggable in principle; this client always
        // targets the first node until a selector is wired in.
        let nodes = self.list_nodes().await?;
        let node = nodes.first().cloned().unwrap_or_else(|| "localhost".to_string());

        let storage_kind = self.validate_storage(&node, &self.config.storage_pool).await?;

        let (template_node, disk_key) = match vps.image.template_name() {
            Some(template) => match self.try_linked_clone(&node, template, vmid, &vps.display_name).await {
                Ok(key) => (node.clone(), key),
                Err(e) => {
                    warn!(error = %e, "linked clone failed, falling back to ISO-boot creation");
                    self.create_from_iso(&node, vmid, &vps.display_name, storage_kind).await?;
                    (node.clone(), String::new())
                }
            },
            None => {
                self.create_from_iso(&node, vmid, &vps.display_name, storage_kind).await?;
                (node.clone(), String::new())
            }
        };

        let disk_key = if disk_key.is_empty() {
            self.ensure_boot_disk(&template_node, vmid, storage_kind, vps.flavor.disk_gib()).await?
        } else {
            disk_key
        };

        self.resize_to_plan(&template_node, vmid, &disk_key, vps.flavor.disk_gib()).await?;

        let password = generate_password();
        self.write_cloud_init(&template_node, vmid, ssh_public_keys, &password, &disk_key).await?;

        self.configure_firewall(&template_node, vmid, &firewall).await?;

        if let Err(e) = self.start_vm(&template_node, vmid).await {
            warn!(vmid, error = %e, "start failed after creation, VM is created and can be started later");
        }

        Ok(CreatedVm {
            vmid,
            node: template_node,
            disk_key,
            credentials: ProvisionedCredentials { username: "root".to_string(), password },
        })
    }

    /// Step 4: clone from a cloud-init template. On success, returns the
    /// template's boot disk key if the clone already carries one; the
    /// caller falls back to `ensure_boot_disk` when it doesn't.
    async fn try_linked_clone(&self, node: &str, template: &str, newid: u32, name: &str) -> Result<String> {
        let template_vmid = self.find_template_vmid(node, template).await?;
        let newid_str = newid.to_string();
        self.post_form(
            &format!("/nodes/{node}/qemu/{template_vmid}/clone"),
            &[("newid", newid_str.as_str()), ("name", name), ("target", node), ("full", "0")],
        )
        .await?;

        let config = self.get(&format!("/nodes/{node}/qemu/{newid}/config")).await?;
        Ok(find_boot_disk_key(&config, None).unwrap_or_default())
    }

    async fn find_template_vmid(&self, node: &str, template: &str) -> Result<u32> {
        let vms = self.list_vms(node).await?;
        vms.into_iter()
            .find(|v| v.get("name").and_then(Value::as_str) == Some(template))
            .and_then(|v| v.get("vmid").and_then(Value::as_u64))
            .map(|id| id as u32)
            .ok_or_else(|| HypervisorError::NoBootDisk(template.to_string()))
    }

    /// Step 4 fallback: ISO-boot creation from scratch — CD-ROM ide2
    /// pointing at `local:iso/…`, boot order `ide2;net0`.
    async fn create_from_iso(&self, node: &str, vmid: u32, name: &str, storage_kind: StoragePoolKind) -> Result<()> {
        let vmid_str = vmid.to_string();
        let iso = format!("local:iso/{name}.iso");
        let disk = disk_spec(storage_kind, &self.config.storage_pool, vmid, 0);
        self.post_form(
            &format!("/nodes/{node}/qemu"),
            &[
                ("vmid", vmid_str.as_str()),
                ("name", name),
                ("ide2", &format!("{iso},media=cdrom")),
                ("scsi0", &disk),
                ("boot", "order=ide2;net0"),
            ],
        )
        .await?;
        Ok(())
    }

    /// Step 5: when the cloned (or freshly created) VM has no boot disk,
    /// materialize one — via the storage-content endpoint for
    /// directory-like storage, or directly in the config update for
    /// block-like storage — and attach it.
    #[instrument(skip(self))]
    async fn ensure_boot_disk(
        &self,
        node: &str,
        vmid: u32,
        storage_kind: StoragePoolKind,
        disk_gib: u64,
    ) -> Result<String> {
        let config = self.get(&format!("/nodes/{node}/qemu/{vmid}/config")).await?;
        if let Some(key) = find_boot_disk_key(&config, None) {
            return Ok(key);
        }

        let pool = &self.config.storage_pool;
        let spec = disk_spec(storage_kind, pool, vmid, disk_gib);

        match storage_kind {
            StoragePoolKind::DirectoryLike => {
                let vmid_str = vmid.to_string();
                let size = format!("{disk_gib}G");
                let result = self
                    .post_form(
                        &format!("/nodes/{node}/storage/{pool}/content"),
                        &[("vmid", vmid_str.as_str()), ("filename", "vm-disk-0.qcow2"), ("size", size.as_str()), ("format", "qcow2")],
                    )
                    .await;
                if result.is_err() {
                    return self.attach_block_disk(node, vmid, pool, disk_gib).await;
                }
                self.attach_disk_config(node, vmid, "scsi0", &spec).await
            }
            StoragePoolKind::BlockLike => self.attach_block_disk(node, vmid, pool, disk_gib).await,
        }
    }

    async fn attach_block_disk(&self, node: &str, vmid: u32, pool: &str, disk_gib: u64) -> Result<String> {
        let spec = disk_spec(StoragePoolKind::BlockLike, pool, vmid, disk_gib);
        self.attach_disk_config(node, vmid, "scsi0", &spec).await
    }

    async fn attach_disk_config(&self, node: &str, vmid: u32, key: &str, spec: &str) -> Result<String> {
        self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config"), &[(key, spec)]).await?;
        Ok(key.to_string())
    }

    /// Locates a just-cloned disk via a storage's content listing, used by
    /// callers that need to confirm what `ensure_boot_disk` created.
    pub async fn find_cloned_disk(&self, node: &str, pool: &str, vmid: u32) -> Result<Option<StorageContentEntry>> {
        let data = self.get(&format!("/nodes/{node}/storage/{pool}/content")).await?;
        let entries: Vec<StorageContentEntry> = serde_json::from_value(data)?;
        Ok(find_disk_in_content(&entries, vmid).cloned())
    }

    /// Step 6: compare current disk size against the flavor's plan and
    /// resize only when they differ.
    #[instrument(skip(self))]
    async fn resize_to_plan(&self, node: &str, vmid: u32, disk_key: &str, disk_gib: u64) -> Result<()> {
        if disk_key.is_empty() {
            return Ok(());
        }
        let config = self.get(&format!("/nodes/{node}/qemu/{vmid}/config")).await?;
        let current_gib = config
            .get(disk_key)
            .and_then(Value::as_str)
            .and_then(current_disk_gib)
            .unwrap_or(0);

        if current_gib == disk_gib {
            debug!(vmid, disk_gib, "disk already at planned size, skipping resize");
            return Ok(());
        }

        let size = format!("{disk_gib}G");
        self.put_form(&format!("/nodes/{node}/qemu/{vmid}/resize"), &[("disk", disk_key), ("size", size.as_str())]).await?;
        Ok(())
    }

    /// Write cloud-init parameters (double-URL-encoded `sshkeys`), then
    /// regen, then pin boot order/bootdisk. On a parsing error specific to
    /// `sshkeys`, retry with a minimal form.
    #[instrument(skip(self, ssh_public_keys, password))]
    async fn write_cloud_init(
        &self,
        node: &str,
        vmid: u32,
        ssh_public_keys: &[String],
        password: &str,
        disk_key: &str,
    ) -> Result<()> {
        let keys_line = format_ssh_keys(ssh_public_keys.iter().map(String::as_str));
        let encoded_keys = double_encode(&keys_line);
        let boot = format!("order={disk_key}");

        let full_form = vec![
            ("ipconfig0", "ip=dhcp".to_string()),
            ("ciuser", "root".to_string()),
            ("cipassword", password.to_string()),
            ("sshkeys", encoded_keys.clone()),
            ("boot", boot.clone()),
            ("bootdisk", disk_key.to_string()),
        ];
        let full_refs: Vec<(&str, &str)> = full_form.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let result = self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config"), &full_refs).await;
        if let Err(e) = result {
            warn!(vmid, error = %e, "cloud-init config update failed, retrying with minimal form");
            let minimal = vec![
                ("ciuser", "root".to_string()),
                ("cipassword", password.to_string()),
                ("boot", boot),
                ("bootdisk", disk_key.to_string()),
            ];
            let minimal_refs: Vec<(&str, &str)> = minimal.iter().map(|(k, v)| (*k, v.as_str())).collect();
            self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config"), &minimal_refs).await?;
        }

        self.post_form(&format!("/nodes/{node}/qemu/{vmid}/cloudinit/regen"), &[]).await?;
        Ok(())
    }

    /// Enable the per-VM firewall and, when isolation is requested, add an
    /// inbound REJECT rule. Org-scope peering only records intent.
    #[instrument(skip(self, intent))]
    async fn configure_firewall(&self, node: &str, vmid: u32, intent: &FirewallIntent) -> Result<()> {
        self.put_form(&format!("/nodes/{node}/qemu/{vmid}/firewall/options"), &[("enable", "1")]).await?;

        if intent.isolate {
            let rule = isolation_reject_rule("net0");
            let body = serde_json::to_value(&rule)?;
            let action = body["action"].as_str().unwrap_or_default().to_string();
            let r#type = body["type"].as_str().unwrap_or_default().to_string();
            let iface = body["iface"].as_str().unwrap_or_default().to_string();
            let comment = body["comment"].as_str().unwrap_or_default().to_string();
            self.post_form(
                &format!("/nodes/{node}/qemu/{vmid}/firewall/rules"),
                &[("action", action.as_str()), ("type", r#type.as_str()), ("iface", iface.as_str()), ("comment", comment.as_str())],
            )
            .await?;
        }

        if intent.allow_inter_vm {
            debug!(vmid, "allowInterVM requested; recording intent only, no rule synthesized (open question)");
        }

        Ok(())
    }

    /// Step 10: start the VM. Failure here does not unwind creation — the
    /// VM already exists and can be started later.
    #[instrument(skip(self))]
    pub async fn start_vm(&self, node: &str, vmid: u32) -> Result<()> {
        self.post_form(&format!("/nodes/{node}/qemu/{vmid}/status/start"), &[]).await?;
        Ok(())
    }

    // ---- VM deletion guard ---------------------------------------------

    /// Before deleting, the hypervisor's reported VM name must equal
    /// `vps_id`; otherwise refuse. If running, force-stop (not graceful)
    /// and poll for `stopped` before removing. "config does not exist" is
    /// treated as already-deleted success.
    #[instrument(skip(self))]
    pub async fn delete_vm(&self, node: &str, vmid: u32, vps_id: &str) -> Result<()> {
        let config = match self.get(&format!("/nodes/{node}/qemu/{vmid}/config")).await {
            Ok(c) => c,
            Err(HypervisorError::RequestFailed { message, .. }) if message.contains("does not exist") => {
                info!(vmid, "config already absent, treating delete as success");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let actual_name = config.get("name").and_then(Value::as_str).unwrap_or_default();
        if actual_name != vps_id {
            return Err(HypervisorError::DeleteGuardRefused {
                vmid,
                expected: vps_id.to_string(),
                actual: actual_name.to_string(),
            });
        }

        let status = self.get(&format!("/nodes/{node}/qemu/{vmid}/status/current")).await?;
        let running = status.get("status").and_then(Value::as_str) == Some("running");

        if running {
            self.post_form(&format!("/nodes/{node}/qemu/{vmid}/status/stop"), &[]).await?;
            self.wait_for_status(node, vmid, "stopped").await?;
        }

        self.delete(&format!("/nodes/{node}/qemu/{vmid}")).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let builder = self.auth.apply(&self.http, self.http.delete(self.url(path)), true).await?;
        Self::unwrap_data(path, builder.send().await?).await?;
        Ok(())
    }

    async fn wait_for_status(&self, node: &str, vmid: u32, want: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + FORCE_STOP_POLL_TIMEOUT;
        loop {
            let status = self.get(&format!("/nodes/{node}/qemu/{vmid}/status/current")).await?;
            if status.get("status").and_then(Value::as_str) == Some(want) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(HypervisorError::StatusTimeout(vmid, want.to_string()));
            }
            tokio::time::sleep(FORCE_STOP_POLL_INTERVAL).await;
        }
    }

    // ---- Terminal / console URLs --------------------------------------

    #[instrument(skip(self))]
    pub async fn vnc_websocket(&self, node: &str, vmid: u32, host: &str) -> Result<String> {
        let data = self.post_form(&format!("/nodes/{node}/qemu/{vmid}/vncproxy"), &[]).await?;
        let ticket = data.get("ticket").and_then(Value::as_str).unwrap_or_default();
        let port = parse_port(data.get("port").unwrap_or(&Value::Null))?;
        Ok(vnc_websocket_url(host, node, vmid, port, ticket))
    }

    /// Same URL shape as `vnc_websocket`, using `vncticket={ticket}`; the
    /// returned user has the token-id suffix spliced on in token auth mode
    /// so the socket peer can authenticate.
    #[instrument(skip(self))]
    pub async fn termproxy(&self, node: &str, vmid: u32, host: &str) -> Result<(String, String)> {
        let data = self.post_form(&format!("/nodes/{node}/qemu/{vmid}/termproxy"), &[]).await?;
        let ticket = data.get("ticket").and_then(Value::as_str).unwrap_or_default();
        let user = data.get("user").and_then(Value::as_str).unwrap_or_default();
        let port = parse_port(data.get("port").unwrap_or(&Value::Null))?;
        let spliced_user = termproxy_user(user, self.auth.mode());
        Ok((vnc_websocket_url(host, node, vmid, port, ticket), spliced_user))
    }

    #[instrument(skip(self))]
    pub async fn serial_console(&self, node: &str, vmid: u32, host: &str) -> Result<String> {
        let data = self.post_form(&format!("/nodes/{node}/qemu/{vmid}/vncproxy"), &[("websocket", "1")]).await?;
        let ticket = data.get("ticket").and_then(Value::as_str).unwrap_or_default();
        let port = parse_port(data.get("port").unwrap_or(&Value::Null))?;
        serial_console_url(host, node, vmid, port, ticket)
    }

    // ---- SSH-key reconciliation wire access ---------------------------

    /// Reads the raw `sshkeys` config value for a VM, as seen by the
    /// hypervisor.
    pub async fn read_ssh_keys(&self, node: &str, vmid: u32) -> Result<String> {
        let config = self.get(&format!("/nodes/{node}/qemu/{vmid}/config")).await?;
        Ok(config.get("sshkeys").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    /// Pushes a serialized, already-formatted key blob. Double-encodes per
    /// `ENCODING_DEPTH`, PUTs, and regenerates cloud-init. When `serialized`
    /// is empty, tries `?delete=sshkeys` first.
    #[instrument(skip(self, serialized))]
    pub async fn push_ssh_keys(&self, node: &str, vmid: u32, serialized: &str) -> Result<()> {
        if serialized.is_empty() {
            let delete_result = self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config?delete=sshkeys"), &[]).await;
            if delete_result.is_err() {
                self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config"), &[("sshkeys", "")]).await?;
            }
        } else {
            let encoded = double_encode(serialized);
            self.put_form(&format!("/nodes/{node}/qemu/{vmid}/config"), &[("sshkeys", encoded.as_str())]).await?;
        }
        self.post_form(&format!("/nodes/{node}/qemu/{vmid}/cloudinit/regen"), &[]).await?;
        Ok(())
    }

    pub fn encoding_depth(&self) -> usize {
        ENCODING_DEPTH
    }
}

/// Parses the `size=NG[,format=...]` portion of a disk config line into
/// whole GiB, used to decide whether a resize is actually needed.
fn current_disk_gib(disk_line: &str) -> Option<u64> {
    disk_line.split(',').find_map(|segment| {
        let (key, value) = segment.split_once('=')?;
        if key != "size" {
            return None;
        }
        value.trim_end_matches(['G', 'g']).parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_disk_gib_parses_size_segment() {
        assert_eq!(current_disk_gib("local:vm-100-disk-0,size=20G"), Some(20));
        assert_eq!(current_disk_gib("local:vm-100-disk-0,size=20G,format=qcow2"), Some(20));
    }

    #[test]
    fn current_disk_gib_none_when_no_size_segment() {
        assert_eq!(current_disk_gib("local:vm-100-disk-0"), None);
    }
}
