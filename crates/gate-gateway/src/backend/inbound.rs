//! Inbound routes
//!
//! Backend services call the gateway through JSON-RPC routes registered here
//! (e.g. `transfer`). The same listener serves `/health` and `/metrics`.

use super::{RpcRequest, RpcResponse};
use crate::protocol::{ErrorCode, RpcError};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Handler for one inbound route
#[async_trait]
pub trait InboundRoute: Send + Sync + 'static {
    /// Handle the call; an `Err` is returned to the calling backend as-is
    async fn handle(&self, params: Value) -> Result<Value, RpcError>;
}

/// Registry of inbound routes by name
#[derive(Clone, Default)]
pub struct InboundRoutes {
    routes: HashMap<String, Arc<dyn InboundRoute>>,
}

impl InboundRoutes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route; a later registration under the same name replaces it
    pub fn register(&mut self, name: impl Into<String>, route: Arc<dyn InboundRoute>) -> &mut Self {
        let name = name.into();
        tracing::debug!(route = %name, "Inbound route registered");
        self.routes.insert(name, route);
        self
    }

    /// Check if a route is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Dispatch a call to the named route
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let route = self.routes.get(method).ok_or_else(|| {
            RpcError::new(ErrorCode::MethodNotFound, format!("no inbound route `{method}`"))
        })?;

        route.handle(params).await
    }
}

impl std::fmt::Debug for InboundRoutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRoutes")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
struct InboundState {
    routes: Arc<InboundRoutes>,
    metrics: Option<PrometheusHandle>,
}

/// Build the backend-facing router
pub fn inbound_router(routes: InboundRoutes, metrics: Option<PrometheusHandle>) -> Router {
    let state = InboundState {
        routes: Arc::new(routes),
        metrics,
    };

    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<InboundState>) -> String {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

async fn rpc_handler(State(state): State<InboundState>, body: Bytes) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid inbound request");
            let code = if serde_json::from_slice::<Value>(&body).is_ok() {
                ErrorCode::InvalidRequest
            } else {
                ErrorCode::ParseError
            };
            return Json(RpcResponse::failure(Value::Null, RpcError::new(code, e.to_string())));
        }
    };

    tracing::debug!(route = %request.method, "Inbound call");

    let response = match state.routes.dispatch(&request.method, request.params).await {
        Ok(result) => RpcResponse::success(request.id, result),
        Err(error) => {
            tracing::debug!(route = %request.method, error = %error, "Inbound call failed");
            RpcResponse::failure(request.id, error)
        }
    };

    Json(response)
}
