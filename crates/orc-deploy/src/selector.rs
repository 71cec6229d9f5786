//! Node selection is treated as an injected policy that returns the target
//! host for a deployment; the policy engine itself is out of scope. A fixed
//! single-node selector ships for standalone use.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedNode {
    pub node_id: String,
    pub node_hostname: String,
}

#[async_trait]
pub trait NodeSelector: Send + Sync {
    async fn select(&self, deployment_id: &str) -> SelectedNode;
}

/// Always selects this controller instance, the expected wiring for a
/// single-controller deployment.
pub struct LocalNodeSelector {
    pub node: SelectedNode,
}

impl LocalNodeSelector {
    pub fn new(node_id: impl Into<String>, node_hostname: impl Into<String>) -> Self {
        Self { node: SelectedNode { node_id: node_id.into(), node_hostname: node_hostname.into() } }
    }
}

#[async_trait]
impl NodeSelector for LocalNodeSelector {
    async fn select(&self, _deployment_id: &str) -> SelectedNode {
        self.node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_selector_always_returns_the_same_node() {
        let selector = LocalNodeSelector::new("local-host1", "host1");
        let a = selector.select("dep1").await;
        let b = selector.select("dep2").await;
        assert_eq!(a, b);
        assert_eq!(a.node_id, "local-host1");
    }
}
