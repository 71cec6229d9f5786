//! A shared `prometheus::Registry` that every component's metrics (the
//! `orc-deploy::DeployMetrics` implementation included) register against,
//! plus a text-exposition encoder for a scrape endpoint.

use crate::error::Result;
use prometheus::{Encoder, Registry, TextEncoder};

pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        registry.register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))?;
        Ok(Self { registry })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the current metric families in Prometheus text exposition
    /// format, for handing to an HTTP scrape handler.
    pub fn gather_text(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().expect("process collector registration cannot fail on first registration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_at_least_the_process_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        let text = registry.gather_text().unwrap();
        assert!(text.contains("process_"));
    }
}
