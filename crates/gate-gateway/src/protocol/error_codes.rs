//! Client-facing error codes
//!
//! Every error a client or a backend caller sees is a coded `RpcError`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Gateway error codes
///
/// The negative codes are the JSON-RPC 2.0 reserved range; the 11xx codes are
/// gateway specific and stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Frame is not valid JSON
    ParseError,
    /// JSON is not a request envelope
    InvalidRequest,
    /// Method is not in `service.action` form, or no such inbound route
    MethodNotFound,
    /// Required parameters missing or malformed
    InvalidParams,
    /// Method not allowed for an anonymous session
    AccessDenied,
    /// Signature verification failed or no usable challenge
    AuthorizationDenied,
    /// Namespace prefix names no configured backend
    ServiceNotFound,
    /// Backend call failed or timed out
    RelayFailed,
    /// Push target connection is gone
    TargetNotFound,
    /// Push delivery failed
    NotifyFailed,
    /// Session is already authorized
    AlreadyAuthorized,
}

impl ErrorCode {
    /// Create an `ErrorCode` from a raw value
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -32700 => Some(Self::ParseError),
            -32600 => Some(Self::InvalidRequest),
            -32601 => Some(Self::MethodNotFound),
            -32602 => Some(Self::InvalidParams),
            1101 => Some(Self::AccessDenied),
            1102 => Some(Self::AuthorizationDenied),
            1103 => Some(Self::ServiceNotFound),
            1104 => Some(Self::RelayFailed),
            1105 => Some(Self::TargetNotFound),
            1106 => Some(Self::NotifyFailed),
            1107 => Some(Self::AlreadyAuthorized),
            _ => None,
        }
    }

    /// Get the raw value
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::AccessDenied => 1101,
            Self::AuthorizationDenied => 1102,
            Self::ServiceNotFound => 1103,
            Self::RelayFailed => 1104,
            Self::TargetNotFound => 1105,
            Self::NotifyFailed => 1106,
            Self::AlreadyAuthorized => 1107,
        }
    }

    /// Get the default message for this code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::AccessDenied => "Access denied",
            Self::AuthorizationDenied => "Authorization denied",
            Self::ServiceNotFound => "Service not found",
            Self::RelayFailed => "Fail to pass data from client to backend",
            Self::TargetNotFound => "Cant transfer to client - not found",
            Self::NotifyFailed => "Notify client fatal error",
            Self::AlreadyAuthorized => "Already authorized",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i64())
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.as_i64()
    }
}

/// Wire error object: `{code, message}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error with an explicit message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_i64(),
            message: message.into(),
            data: None,
        }
    }

    /// Gateway-specific code, if this error carries one of ours
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_i64(self.code)
    }
}

impl From<ErrorCode> for RpcError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}
