//! Backend connector contract

use crate::protocol::RpcError;
use async_trait::async_trait;
use serde_json::Value;

/// Backend call errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No endpoint configured for the service
    #[error("unknown backend service: {0}")]
    UnknownService(String),

    /// Call did not complete in time
    #[error("backend call timed out")]
    Timeout,

    /// Connection or transport failure
    #[error("backend transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("backend responded with status {0}")]
    Status(u16),

    /// Response body is not a JSON-RPC response
    #[error("invalid backend response: {0}")]
    Decode(String),

    /// The backend answered with its own error envelope
    #[error("backend error: {0}")]
    Remote(RpcError),
}

impl BackendError {
    /// Check if the backend answered at all (as opposed to the call failing)
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Dispatches named calls to named backend services
#[async_trait]
pub trait BackendConnector: Send + Sync + 'static {
    /// Call `method` on `service` and wait for its result
    async fn call(&self, service: &str, method: &str, payload: Value) -> Result<Value, BackendError>;
}
