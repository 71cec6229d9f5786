//! Telemetry configuration: how logs are rendered and which metrics/health
//! surface is exposed. Loaded the same way as the rest of the control
//! plane's config — defaults, overridden by env vars at the call site.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    /// Render log events as JSON lines instead of the human-readable format.
    /// Production deployments want JSON for log aggregators; local runs want
    /// the pretty formatter.
    pub json_logs: bool,
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or
    /// "orc_deploy=debug,orc_runtime=info".
    pub log_filter: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "orchestrator".to_string(),
            environment: "development".to_string(),
            json_logs: false,
            log_filter: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("ORC_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(env) = std::env::var("ORC_ENVIRONMENT") {
            config.environment = env;
        }
        if let Ok(json) = std::env::var("ORC_LOG_JSON") {
            config.json_logs = json.parse().unwrap_or(false);
        }
        if let Ok(filter) = std::env::var("ORC_LOG_FILTER") {
            config.log_filter = filter;
        }
        if let Ok(enabled) = std::env::var("ORC_METRICS_ENABLED") {
            config.metrics_enabled = enabled.parse().unwrap_or(true);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favor_human_readable_logs() {
        let config = TelemetryConfig::default();
        assert!(!config.json_logs);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn from_env_overrides_json_flag() {
        std::env::set_var("ORC_LOG_JSON", "true");
        let config = TelemetryConfig::from_env();
        std::env::remove_var("ORC_LOG_JSON");
        assert!(config.json_logs);
    }
}
