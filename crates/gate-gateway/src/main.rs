//! Gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p gate-gateway
//! ```
//!
//! Configuration is loaded from environment variables (and `.env` if present).

use gate_common::metrics::{install_recorder, SERVICE_START_TOTAL, SERVICE_STOP_TOTAL};
use gate_common::{try_init_tracing_with_config, AppResult, ConfigError, GateConfig, TracingConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = GateConfig::from_env();

    let tracing_config = match &config {
        Ok(config) => TracingConfig::for_environment(config.app.env),
        Err(_) => TracingConfig::default(),
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "Gate failed");
        std::process::exit(1);
    }
}

async fn run(config: Result<GateConfig, ConfigError>) -> AppResult<()> {
    let config = config.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        app = %config.app.name,
        env = ?config.app.env,
        listen = %config.listen.address(),
        inner = %config.inner.address(),
        "Starting gate"
    );

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            None
        }
    };

    metrics::counter!(SERVICE_START_TOTAL).increment(1);
    gate_gateway::run(config, metrics).await?;
    metrics::counter!(SERVICE_STOP_TOTAL).increment(1);

    info!("Gate stopped");
    Ok(())
}
