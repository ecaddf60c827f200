//! Test fixtures
//!
//! An in-process backend standing in for the facade and auth services.

use async_trait::async_trait;
use gate_gateway::backend::{BackendConnector, BackendError};
use gate_gateway::protocol::{ErrorCode, RpcError};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// One call received by the mock backend
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub service: String,
    pub method: String,
    pub payload: Value,
}

/// Backend answering like the facade and auth services
///
/// - `auth.generateSecret` returns `secret-<channelId>`
/// - `auth.authorize` accepts the signature `signed:<secret>`
/// - `facade.fail` fails at the transport level
/// - `facade.reject` answers with the backend's own error envelope
/// - everything else echoes the payload back as `{echo: payload}`
#[derive(Debug, Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    /// Payloads of every call to `method`, in arrival order
    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.payload.clone())
            .collect()
    }

    /// Service of the last call to `method`
    pub fn service_of(&self, method: &str) -> Option<String> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|call| call.method == method)
            .map(|call| call.service.clone())
    }
}

#[async_trait]
impl BackendConnector for MockBackend {
    async fn call(&self, service: &str, method: &str, payload: Value) -> Result<Value, BackendError> {
        self.calls.lock().push(BackendCall {
            service: service.to_string(),
            method: method.to_string(),
            payload: payload.clone(),
        });

        match method {
            "auth.generateSecret" => Ok(json!(format!("secret-{}", payload["channelId"]))),
            "auth.authorize" => {
                let expected = format!("signed:{}", payload["secret"].as_str().unwrap_or_default());
                if payload["sign"] == expected {
                    Ok(json!({ "user": payload["user"], "roles": ["member"] }))
                } else {
                    Err(BackendError::Remote(RpcError::new(
                        ErrorCode::AuthorizationDenied,
                        "signature mismatch",
                    )))
                }
            }
            "offline" => Ok(Value::Null),
            "facade.fail" => Err(BackendError::Transport("connection refused".to_string())),
            "facade.reject" => Err(BackendError::Remote(RpcError {
                code: 404,
                message: "post not found".to_string(),
                data: None,
            })),
            _ => Ok(json!({ "echo": payload })),
        }
    }
}

/// Signature the mock auth backend accepts for a secret
pub fn sign(secret: &str) -> String {
    format!("signed:{secret}")
}
