//! Wire message format
//!
//! Inbound frames are request envelopes `{id, method, params}`. Outbound frames are
//! responses `{id, result | error}` or id-less notifications `{method, params | result | error}`.

use super::RpcError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved id carried by server notifications until the framer strips it
pub const NOTIFY_ID: &str = "rpc-notify";

const JSONRPC_VERSION: &str = "2.0";

/// A request envelope received from a client
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    /// Caller-supplied id (string or number), echoed verbatim on the response
    pub id: Value,
    pub method: String,
    /// Always a JSON object; `{}` when the client omitted params
    pub params: Value,
}

impl IncomingRequest {
    /// Get a parameter by name
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// Outcome of parsing one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    /// A well-formed request envelope
    Request(IncomingRequest),
    /// Not a request envelope; `id` is set when one could be recovered
    Malformed { id: Option<Value>, reason: String },
    /// Valid JSON without an id; dropped, never answered
    MissingId,
}

/// Parse an inbound text frame
pub fn parse_frame(text: &str) -> ParsedFrame {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            return ParsedFrame::Malformed {
                id: None,
                reason: format!("invalid JSON: {e}"),
            }
        }
    };

    let Value::Object(mut object) = value else {
        return ParsedFrame::Malformed {
            id: None,
            reason: "message is not a JSON object".to_string(),
        };
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => return ParsedFrame::MissingId,
        Some(id @ (Value::String(_) | Value::Number(_))) => id,
        Some(_) => {
            return ParsedFrame::Malformed {
                id: None,
                reason: "id must be a string or a number".to_string(),
            }
        }
    };

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => {
            return ParsedFrame::Malformed {
                id: Some(id),
                reason: "method must be a non-empty string".to_string(),
            }
        }
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(params @ Value::Object(_)) => params,
        Some(_) => {
            return ParsedFrame::Malformed {
                id: Some(id),
                reason: "params must be an object".to_string(),
            }
        }
    };

    ParsedFrame::Request(IncomingRequest { id, method, params })
}

/// Id of an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageId {
    /// Echo of a client request id
    Request(Value),
    /// Server-initiated notification; serialized without an id
    Notify,
}

impl MessageId {
    #[must_use]
    pub fn is_notify(&self) -> bool {
        matches!(self, Self::Notify)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(id) => id.serialize(serializer),
            Self::Notify => serializer.serialize_str(NOTIFY_ID),
        }
    }
}

/// A message sent to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    jsonrpc: &'static str,

    #[serde(skip_serializing_if = "MessageId::is_notify")]
    pub id: MessageId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl OutgoingMessage {
    fn base(id: MessageId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    // === Responses ===

    /// Successful response to a client request
    #[must_use]
    pub fn response(id: Value, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::base(MessageId::Request(id))
        }
    }

    /// Error response to a client request
    #[must_use]
    pub fn error(id: Value, error: impl Into<RpcError>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(MessageId::Request(id))
        }
    }

    // === Notifications ===

    /// Server-initiated request-shaped notification (e.g. the `sign` challenge)
    #[must_use]
    pub fn notify(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: Some(method.into()),
            params: Some(params),
            ..Self::base(MessageId::Notify)
        }
    }

    /// Backend push carrying a result
    #[must_use]
    pub fn push_result(method: impl Into<String>, result: Value) -> Self {
        Self {
            method: Some(method.into()),
            result: Some(result),
            ..Self::base(MessageId::Notify)
        }
    }

    /// Backend push carrying an error
    #[must_use]
    pub fn push_error(method: impl Into<String>, error: RpcError) -> Self {
        Self {
            method: Some(method.into()),
            error: Some(error),
            ..Self::base(MessageId::Notify)
        }
    }

    // === Utilities ===

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_notify()
    }

    /// The request id this message answers, if any
    #[must_use]
    pub fn request_id(&self) -> Option<&Value> {
        match &self.id {
            MessageId::Request(id) => Some(id),
            MessageId::Notify => None,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for OutgoingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.method) {
            (MessageId::Request(id), _) => write!(f, "Response(id={id}, error={})", self.is_error()),
            (MessageId::Notify, Some(method)) => write!(f, "Notify(method={method})"),
            (MessageId::Notify, None) => write!(f, "Notify"),
        }
    }
}
