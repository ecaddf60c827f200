//! Connection events
//!
//! The connection manager reports every lifecycle change and every parsed
//! message of every connection to exactly one `EventHandler`.

use super::Pipe;
use crate::protocol::{ChannelId, IncomingRequest};
use serde_json::Value;

/// What happened on a connection
#[derive(Debug)]
pub enum GateEvent {
    /// Connection accepted; delivered before any message of that connection
    Open,
    /// A well-formed request
    Message(IncomingRequest),
    /// A frame that is not a request envelope
    Malformed { id: Option<Value>, reason: String },
    /// Peer closed, or the connection was evicted
    Close,
    /// Socket-level error
    Error,
}

impl GateEvent {
    /// Check if this event ends the connection
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Close | Self::Error)
    }

    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Malformed { .. } => "malformed",
            Self::Close => "close",
            Self::Error => "error",
        }
    }
}

/// An event together with the connection it belongs to
#[derive(Debug)]
pub struct ConnectionEvent {
    pub channel_id: ChannelId,
    /// Peer address, suffixed with the first `X-Forwarded-For` hop when present
    pub client_ip: String,
    /// Reply function bound to this connection
    pub pipe: Pipe,
    pub event: GateEvent,
}

/// Consumer of connection events
///
/// Called synchronously from the connection's task, so implementations must
/// hand work off instead of awaiting backend calls inline.
pub trait EventHandler: Send + Sync + 'static {
    fn handle_event(&self, event: ConnectionEvent);
}
