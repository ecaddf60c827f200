//! Metric names and the Prometheus recorder.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Client connections accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "gate_connections_total";
/// Client connections currently open (gauge).
pub const CONNECTIONS_ACTIVE: &str = "gate_connections_active";
/// Client connections closed (counter, labels: reason = close | error).
pub const DISCONNECTIONS_TOTAL: &str = "gate_disconnections_total";
/// Socket-level errors (counter).
pub const CONNECTION_ERRORS_TOTAL: &str = "gate_connection_errors_total";
/// Connections dropped by the liveness sweep (counter).
pub const EVICTED_TOTAL: &str = "gate_evicted_total";
/// Inbound frames that were not valid request envelopes (counter).
pub const PARSE_ERRORS_TOTAL: &str = "gate_parse_errors_total";
/// Client requests handled (counter).
pub const REQUESTS_TOTAL: &str = "gate_requests_total";
/// Failed relays to a backend (counter).
pub const RELAY_ERRORS_TOTAL: &str = "gate_relay_errors_total";
/// Authorization duration (histogram, labels: outcome).
pub const AUTH_DURATION_SECONDS: &str = "gate_auth_duration_seconds";
/// Backend pushes (counter, labels: outcome).
pub const PUSH_TOTAL: &str = "gate_push_total";
/// Outgoing envelopes that could not be serialized (counter).
pub const SERIALIZATION_ERRORS_TOTAL: &str = "gate_serialization_errors_total";
/// Gateway starts (counter).
pub const SERVICE_START_TOTAL: &str = "gate_service_start_total";
/// Gateway graceful stops (counter).
pub const SERVICE_STOP_TOTAL: &str = "gate_service_stop_total";
