//! Terminal/console URL minting. Endpoints return `port` as a string,
//! integer, or float; all three are accepted and anything else is rejected.

use crate::auth::AuthMode;
use crate::error::{HypervisorError, Result};
use serde_json::Value;

/// Accepts `port` as string, integer, or float — the hypervisor API is
/// inconsistent about which shape it returns for this field.
pub fn parse_port(value: &Value) -> Result<u32> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map(|f| f as u32)
            .map_err(|_| HypervisorError::UnexpectedResponse { endpoint: "vncproxy/termproxy".into(), message: format!("unparseable port string: {s}") }),
        Value::Number(n) => n
            .as_f64()
            .map(|f| f as u32)
            .ok_or_else(|| HypervisorError::UnexpectedResponse { endpoint: "vncproxy/termproxy".into(), message: "port number out of range".into() }),
        other => Err(HypervisorError::UnexpectedResponse {
            endpoint: "vncproxy/termproxy".into(),
            message: format!("unexpected port shape: {other:?}"),
        }),
    }
}

pub fn vnc_websocket_url(host: &str, node: &str, vmid: u32, port: u32, ticket: &str) -> String {
    format!("wss://{host}/api2/json/nodes/{node}/qemu/{vmid}/vncwebsocket?port={port}&vncticket={ticket}")
}

pub fn serial_console_url(host: &str, node: &str, vmid: u32, port: u32, ticket: &str) -> Result<String> {
    if !(100..=999_999_999).contains(&vmid) {
        return Err(HypervisorError::UnexpectedResponse {
            endpoint: "vncproxy (serial)".into(),
            message: format!("vmid {vmid} out of accepted range"),
        });
    }
    if !(5900..=5999).contains(&port) {
        return Err(HypervisorError::UnexpectedResponse {
            endpoint: "vncproxy (serial)".into(),
            message: format!("port {port} out of accepted range 5900-5999"),
        });
    }
    Ok(vnc_websocket_url(host, node, vmid, port, ticket))
}

/// Termproxy returns a user identity alongside the ticket; in token auth
/// mode the `!tokenid` suffix is spliced onto the returned user if missing,
/// so the socket peer authenticates the same way the HTTP calls did.
pub fn termproxy_user(returned_user: &str, mode: &AuthMode) -> String {
    match mode {
        AuthMode::Token { token_id, .. } => {
            let suffix = token_id.split('!').nth(1).map(|id| format!("!{id}"));
            match suffix {
                Some(suffix) if !returned_user.ends_with(&suffix) => format!("{returned_user}{suffix}"),
                _ => returned_user.to_string(),
            }
        }
        AuthMode::Password { .. } => returned_user.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_int_and_float_ports() {
        assert_eq!(parse_port(&json!("5900")).unwrap(), 5900);
        assert_eq!(parse_port(&json!(5900)).unwrap(), 5900);
        assert_eq!(parse_port(&json!(5900.0)).unwrap(), 5900);
    }

    #[test]
    fn rejects_unparseable_port_shape() {
        assert!(parse_port(&json!(null)).is_err());
        assert!(parse_port(&json!(["not", "a", "port"])).is_err());
    }

    #[test]
    fn serial_console_validates_ranges() {
        assert!(serial_console_url("host", "node1", 100, 5900, "t").is_ok());
        assert!(serial_console_url("host", "node1", 99, 5900, "t").is_err());
        assert!(serial_console_url("host", "node1", 100, 6000, "t").is_err());
    }

    #[test]
    fn token_mode_splices_tokenid_suffix_when_missing() {
        let mode = AuthMode::Token { token_id: "user@pve!orc".to_string(), secret: "s".to_string() };
        assert_eq!(termproxy_user("user@pve", &mode), "user@pve!orc");
        assert_eq!(termproxy_user("user@pve!orc", &mode), "user@pve!orc");
    }

    #[test]
    fn password_mode_leaves_user_unchanged() {
        let mode = AuthMode::Password { username: "root".to_string(), password: "x".to_string() };
        assert_eq!(termproxy_user("root@pam", &mode), "root@pam");
    }
}
