//! Forwarding a create request to a sibling controller when the selected
//! host isn't this instance. Optional: when no forwarder is configured, or
//! it declines, the manager proceeds locally with a warning.

use async_trait::async_trait;

#[async_trait]
pub trait NodeForwarder: Send + Sync {
    /// `Ok(true)` means the remote accepted and handled the request;
    /// `Ok(false)` means the forwarder declined (e.g. unreachable) and the
    /// caller should proceed locally.
    async fn forward_create(&self, node_hostname: &str, deployment_id: &str) -> bool;
}

/// No forwarder configured: every request proceeds locally.
pub struct NoopForwarder;

#[async_trait]
impl NodeForwarder for NoopForwarder {
    async fn forward_create(&self, _node_hostname: &str, _deployment_id: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_forwarder_always_declines() {
        assert!(!NoopForwarder.forward_create("host2", "dep1").await);
    }
}
