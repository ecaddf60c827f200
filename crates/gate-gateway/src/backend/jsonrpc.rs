//! JSON-RPC 2.0 over HTTP
//!
//! Envelope types shared by the outbound client and the inbound server, and the
//! `reqwest` based connector used in production.

use super::{BackendConnector, BackendError};
use crate::protocol::RpcError;
use async_trait::async_trait;
use gate_common::BackendsConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    #[must_use]
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Convert into the call outcome
    pub fn into_result(self) -> Result<Value, BackendError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(BackendError::Remote(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Backend connector speaking JSON-RPC over HTTP POST
pub struct JsonRpcConnector {
    client: reqwest::Client,
    /// Service name to endpoint URL
    endpoints: BTreeMap<String, String>,
    next_id: AtomicU64,
}

impl JsonRpcConnector {
    /// Create a connector for the configured services
    pub fn new(config: &BackendsConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoints: config.services.clone(),
            next_id: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl BackendConnector for JsonRpcConnector {
    async fn call(&self, service: &str, method: &str, payload: Value) -> Result<Value, BackendError> {
        let url = self
            .endpoints
            .get(service)
            .ok_or_else(|| BackendError::UnknownService(service.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = RpcRequest::new(id, method, payload);

        tracing::trace!(service = %service, method = %method, id = id, "Backend call");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let body: RpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::Decode(e.to_string())
            }
        })?;

        body.into_result()
    }
}

impl std::fmt::Debug for JsonRpcConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcConnector")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
