//! Handler error types

use crate::backend::BackendError;
use crate::protocol::{ErrorCode, RpcError};
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Frame is not a request envelope
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Required parameters missing or malformed
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Method is not in `service.action` form
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Method not allowed for an anonymous session
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Signature verification failed
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Already authorized
    #[error("Already authorized")]
    AlreadyAuthorized,

    /// No backend for the namespace
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Backend call failed
    #[error("Relay failed: {0}")]
    Backend(#[from] BackendError),
}

impl HandlerError {
    /// Get the error code reported to the client
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Self::AccessDenied(_) => ErrorCode::AccessDenied,
            Self::AuthorizationDenied(_) => ErrorCode::AuthorizationDenied,
            Self::AlreadyAuthorized => ErrorCode::AlreadyAuthorized,
            Self::ServiceNotFound(_) => ErrorCode::ServiceNotFound,
            Self::Backend(_) => ErrorCode::RelayFailed,
        }
    }

    /// Convert to the client-facing error
    ///
    /// Backend failures never leak their detail; a backend's own error envelope
    /// is passed through unchanged.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Backend(BackendError::Remote(remote)) => remote.clone(),
            Self::Backend(_) => ErrorCode::RelayFailed.into(),
            Self::AlreadyAuthorized => ErrorCode::AlreadyAuthorized.into(),
            Self::InvalidRequest(detail)
            | Self::InvalidParams(detail)
            | Self::MethodNotFound(detail)
            | Self::AccessDenied(detail)
            | Self::AuthorizationDenied(detail)
            | Self::ServiceNotFound(detail) => RpcError::new(self.code(), detail.clone()),
        }
    }
}

impl From<HandlerError> for RpcError {
    fn from(err: HandlerError) -> Self {
        err.to_rpc_error()
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
