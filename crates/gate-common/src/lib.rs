//! # gate-common
//!
//! Shared utilities including configuration, error handling, telemetry, and metrics.

pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, AuthConfig, BackendsConfig, ConfigError, Environment, GateConfig, ListenConfig,
    SecretSource,
};
pub use error::{AppError, AppResult};
pub use telemetry::{
    try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError,
};
