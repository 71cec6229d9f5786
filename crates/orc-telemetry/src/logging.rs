//! Structured logging init, shared by `orc-cli` and any long-running
//! control-plane process. Call `init_logging` once at process start; a
//! second call returns `AlreadyInitialized` rather than panicking, so tests
//! that spin up multiple components in one process can call it freely.

use crate::config::TelemetryConfig;
use crate::error::{Result, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub fn init_logging(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.log_filter)
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;

    let registry = Registry::default().with(env_filter);

    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_an_invalid_filter_directive() {
        let config = TelemetryConfig {
            log_filter: "this is not a valid directive ===".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(TelemetryError::InvalidFilter(_))));
    }
}
