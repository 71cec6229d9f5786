//! Reconciliation metrics, behind a trait so the manager doesn't hard-depend
//! on one metrics backend wire format.

pub trait DeployMetrics: Send + Sync {
    fn record_outcome(&self, operation: &str, success: bool);
}

/// No-op implementation for tests and standalone runs that don't wire a
/// real metrics backend.
pub struct NoopMetrics;

impl DeployMetrics for NoopMetrics {
    fn record_outcome(&self, _operation: &str, _success: bool) {}
}

/// `prometheus`-backed implementation: one `IntCounterVec` labeled by
/// `(operation, outcome)`.
pub struct PrometheusMetrics {
    outcomes: prometheus::IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let outcomes = prometheus::IntCounterVec::new(
            prometheus::Opts::new("orchestrator_deploy_operation_total", "Deployment Manager operation outcomes"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;
        Ok(Self { outcomes })
    }
}

impl DeployMetrics for PrometheusMetrics {
    fn record_outcome(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.outcomes.with_label_values(&[operation, outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_metrics_registers_and_records() {
        let registry = prometheus::Registry::new();
        let metrics = PrometheusMetrics::new(&registry).unwrap();
        metrics.record_outcome("create", true);
        metrics.record_outcome("create", false);
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "orchestrator_deploy_operation_total"));
    }

    #[test]
    fn noop_metrics_does_nothing_observable() {
        NoopMetrics.record_outcome("create", true);
    }
}
