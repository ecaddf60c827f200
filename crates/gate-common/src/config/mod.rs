//! Configuration structs

mod gate_config;

pub use gate_config::{
    AppSettings, AuthConfig, BackendsConfig, ConfigError, Environment, GateConfig, ListenConfig,
    SecretSource, AUTH_SERVICE, FACADE_SERVICE,
};
