//! Gateway server setup
//!
//! Two listeners: the client-facing WebSocket server and the backend-facing
//! inbound-route server (which also serves `/health` and `/metrics`).

mod handler;
mod state;

pub use handler::gateway_handler;
pub use state::GatewayState;

use crate::backend::{inbound_router, BackendConnector, JsonRpcConnector};
use crate::broker::{SessionBroker, SignatureVerifier};
use crate::connection::ConnectionManager;
use axum::{routing::get, Router};
use gate_common::{AppError, AppResult, GateConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/", get(gateway_handler))
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Gateway builder
///
/// Collaborators default to the JSON-RPC connector and the auth-backend
/// verifier; tests inject their own.
pub struct Gateway {
    config: GateConfig,
    backend: Option<Arc<dyn BackendConnector>>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    metrics: Option<PrometheusHandle>,
}

impl Gateway {
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            backend: None,
            verifier: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn BackendConnector>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Serve `/metrics` from this recorder handle
    #[must_use]
    pub fn with_metrics(mut self, metrics: PrometheusHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind both listeners and start serving
    pub async fn start(self) -> AppResult<RunningGateway> {
        let config = self.config;

        let backend: Arc<dyn BackendConnector> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(JsonRpcConnector::new(&config.backends).map_err(AppError::internal)?),
        };
        let broker = match self.verifier {
            Some(verifier) => SessionBroker::new(
                config.auth.clone(),
                config.backends.services.keys().cloned(),
                backend,
                verifier,
            ),
            None => SessionBroker::from_config(config.auth.clone(), &config.backends, backend),
        };
        let connections = ConnectionManager::new_shared(config.client_timeout());

        let client_listener = bind(&config.listen.address()).await?;
        let inner_listener = bind(&config.inner.address()).await?;
        let client_addr = client_listener.local_addr().map_err(AppError::internal)?;
        let inner_addr = inner_listener.local_addr().map_err(AppError::internal)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = GatewayState::new(
            connections.clone(),
            Arc::new(broker.clone()),
            config.max_message_bytes,
        );
        let app = create_app(state);
        let client_server = tokio::spawn({
            let mut shutdown = shutdown_rx.clone();
            async move {
                axum::serve(
                    client_listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
            }
        });

        let inner_app = inbound_router(broker.inbound_routes(), self.metrics);
        let inner_server = tokio::spawn({
            let mut shutdown = shutdown_rx;
            async move {
                axum::serve(inner_listener, inner_app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown.changed().await;
                    })
                    .await
            }
        });

        let sweeper = connections.clone().spawn_sweeper();

        tracing::info!(
            client_addr = %client_addr,
            inner_addr = %inner_addr,
            auth_enabled = config.auth.enabled,
            probe_interval_ms = config.client_timeout_ms,
            "Gate server listening"
        );

        Ok(RunningGateway {
            client_addr,
            inner_addr,
            broker,
            connections,
            shutdown: shutdown_tx,
            sweeper,
            servers: vec![client_server, inner_server],
        })
    }
}

async fn bind(addr: &str) -> AppResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::bind(addr, e))
}

/// A started gateway
pub struct RunningGateway {
    client_addr: SocketAddr,
    inner_addr: SocketAddr,
    broker: SessionBroker,
    connections: Arc<ConnectionManager>,
    shutdown: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
    servers: Vec<JoinHandle<std::io::Result<()>>>,
}

impl RunningGateway {
    /// Bound address of the client WebSocket listener
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Bound address of the inbound-route listener
    pub fn inner_addr(&self) -> SocketAddr {
        self.inner_addr
    }

    pub fn broker(&self) -> &SessionBroker {
        &self.broker
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Stop accepting, drop live connections and wait for both servers
    pub async fn shutdown(self) -> AppResult<()> {
        tracing::info!("Gate server stopping");

        let _ = self.shutdown.send(true);
        self.sweeper.abort();
        let terminated = self.connections.terminate_all();

        for server in self.servers {
            server
                .await
                .map_err(AppError::internal)?
                .map_err(|e| AppError::Server(e.to_string()))?;
        }

        tracing::info!(terminated = terminated, "Gate server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RunningGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningGateway")
            .field("client_addr", &self.client_addr)
            .field("inner_addr", &self.inner_addr)
            .field("connections", &self.connections)
            .finish()
    }
}

/// Run the gateway until SIGINT or SIGTERM
pub async fn run(config: GateConfig, metrics: Option<PrometheusHandle>) -> AppResult<()> {
    let mut gateway = Gateway::new(config);
    if let Some(metrics) = metrics {
        gateway = gateway.with_metrics(metrics);
    }

    let running = gateway.start().await?;
    shutdown_signal().await;
    running.shutdown().await
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    tracing::info!("Shutdown signal received");
}
