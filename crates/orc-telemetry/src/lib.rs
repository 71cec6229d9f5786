//! Structured logging and metrics initialization shared by every
//! long-running control-plane binary, plus a small health aggregation
//! primitive for readiness checks.

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use error::{Result, TelemetryError};
pub use health::{aggregate_status, ComponentHealth, HealthCheck, HealthStatus, SystemHealth};
pub use logging::init_logging;
pub use metrics::MetricsRegistry;
