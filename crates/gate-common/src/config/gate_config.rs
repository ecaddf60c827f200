//! Gateway configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Name of the facade backend service
pub const FACADE_SERVICE: &str = "facade";

/// Name of the auth backend service
pub const AUTH_SERVICE: &str = "auth";

/// Main gateway configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub app: AppSettings,
    /// Client-facing WebSocket listener
    pub listen: ListenConfig,
    /// Backend-facing listener for inbound routes, health and metrics
    pub inner: ListenConfig,
    /// Liveness probe interval in milliseconds
    pub client_timeout_ms: u64,
    /// Maximum accepted size of one inbound frame
    pub max_message_bytes: usize,
    pub backends: BackendsConfig,
    pub auth: AuthConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Listen endpoint configuration
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl ListenConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Backend services reachable through the RPC connector
#[derive(Debug, Clone)]
pub struct BackendsConfig {
    /// Service name to JSON-RPC endpoint URL
    pub services: BTreeMap<String, String>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl BackendsConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where challenge secrets come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretSource {
    /// Ask the auth backend (`auth.generateSecret`)
    #[default]
    Backend,
    /// Generate a random secret inside the gateway
    Local,
}

impl FromStr for SecretSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backend" => Ok(Self::Backend),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::InvalidValue(
                "GATE_AUTH_SECRET_SOURCE",
                other.to_string(),
            )),
        }
    }
}

/// Authentication policy
///
/// `enabled` is the single switch from which challenge issuance, the authorize
/// requirement and the anonymous allow-list all derive.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub secret_source: SecretSource,
    /// Keep the challenge usable after a failed authorize
    pub retry_same_secret: bool,
    /// Methods callable while the session is anonymous
    pub anonymous_methods: BTreeSet<String>,
}

impl AuthConfig {
    /// Check whether an anonymous session may call `method`
    #[must_use]
    pub fn allows_anonymous(&self, method: &str) -> bool {
        !self.enabled || self.anonymous_methods.contains(method)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_source: SecretSource::default(),
            retry_same_secret: false,
            anonymous_methods: BTreeSet::new(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "frontend-gate".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_inner_host() -> String {
    "127.0.0.1".to_string()
}

fn default_inner_port() -> u16 {
    8081
}

fn default_client_timeout_ms() -> u64 {
    60_000
}

fn default_backend_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

impl GateConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut services = BTreeMap::new();

        let facade = lookup("GATE_FACADE_CONNECT")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingVar("GATE_FACADE_CONNECT"))?;
        services.insert(FACADE_SERVICE.to_string(), facade);

        if let Some(auth) = lookup("GATE_AUTH_CONNECT").filter(|s| !s.trim().is_empty()) {
            services.insert(AUTH_SERVICE.to_string(), auth);
        }

        if let Some(extra) = lookup("GATE_EXTRA_BACKENDS") {
            for (name, url) in parse_backend_list(&extra)? {
                services.insert(name, url);
            }
        }

        let auth = AuthConfig {
            enabled: parse_or(&lookup, "GATE_AUTH_ENABLED", parse_bool, true)?,
            secret_source: parse_or(&lookup, "GATE_AUTH_SECRET_SOURCE", str::parse, SecretSource::Backend)?,
            retry_same_secret: parse_or(&lookup, "GATE_AUTH_RETRY_SAME_SECRET", parse_bool, false)?,
            anonymous_methods: lookup("GATE_ANONYMOUS_METHODS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };

        if auth.enabled && !services.contains_key(AUTH_SERVICE) {
            return Err(ConfigError::MissingVar("GATE_AUTH_CONNECT"));
        }

        let client_timeout_ms = parse_or(
            &lookup,
            "GATE_CLIENT_TIMEOUT_MS",
            str::parse,
            default_client_timeout_ms(),
        )?;
        if client_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("GATE_CLIENT_TIMEOUT_MS", "0".to_string()));
        }

        let backend_timeout_ms = parse_or(
            &lookup,
            "GATE_BACKEND_TIMEOUT_MS",
            str::parse,
            default_backend_timeout_ms(),
        )?;
        if backend_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("GATE_BACKEND_TIMEOUT_MS", "0".to_string()));
        }

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            listen: ListenConfig {
                host: lookup("GATE_LISTEN_HOST").unwrap_or_else(default_listen_host),
                port: parse_or(&lookup, "GATE_LISTEN_PORT", str::parse, default_listen_port())?,
            },
            inner: ListenConfig {
                host: lookup("GATE_INNER_HOST").unwrap_or_else(default_inner_host),
                port: parse_or(&lookup, "GATE_INNER_PORT", str::parse, default_inner_port())?,
            },
            client_timeout_ms,
            max_message_bytes: parse_or(
                &lookup,
                "GATE_MAX_MESSAGE_BYTES",
                str::parse,
                default_max_message_bytes(),
            )?,
            backends: BackendsConfig {
                services,
                timeout_ms: backend_timeout_ms,
            },
            auth,
        })
    }

    /// Liveness probe interval
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }
}

/// Parse an optional variable, falling back to `default` when it is unset
fn parse_or<F, T, P, E>(lookup: &F, key: &'static str, parse: P, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, E>,
{
    match lookup(key) {
        Some(raw) => {
            parse(raw.trim()).map_err(|_| ConfigError::InvalidValue(key, raw.clone()))
        }
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool, ()> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(()),
    }
}

/// Parse `name=url,name=url`
fn parse_backend_list(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidValue("GATE_EXTRA_BACKENDS", entry.to_string()))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() || name.contains('.') {
                return Err(ConfigError::InvalidValue("GATE_EXTRA_BACKENDS", entry.to_string()));
            }
            Ok((name.to_string(), url.to_string()))
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
