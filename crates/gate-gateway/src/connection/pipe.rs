//! Reply pipes
//!
//! A `Pipe` writes outgoing messages to one specific connection and stays
//! usable (as a no-op) after that connection is gone.

use super::Outbound;
use crate::protocol::{ChannelId, ErrorCode, OutgoingMessage};
use gate_common::metrics::SERIALIZATION_ERRORS_TOTAL;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Pipe errors
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// The connection has already closed
    #[error("connection {0} is closed")]
    Closed(ChannelId),

    /// The peer is not draining its outgoing queue
    #[error("outgoing queue of connection {0} is full")]
    Full(ChannelId),
}

/// Reply function bound to one connection
#[derive(Clone)]
pub struct Pipe {
    channel_id: ChannelId,
    sender: mpsc::Sender<Outbound>,
}

impl Pipe {
    pub(crate) fn new(channel_id: ChannelId, sender: mpsc::Sender<Outbound>) -> Self {
        Self { channel_id, sender }
    }

    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Check if the connection behind this pipe is still open
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Serialize and queue a message for this connection
    ///
    /// Never waits: a peer that stopped reading has a full queue and the
    /// message is refused.
    pub fn send(&self, message: OutgoingMessage) -> Result<(), PipeError> {
        let text = encode(&message);

        self.sender
            .try_send(Outbound::Text(text))
            .map_err(|e| match e {
                TrySendError::Full(_) => PipeError::Full(self.channel_id),
                TrySendError::Closed(_) => PipeError::Closed(self.channel_id),
            })
    }

    /// Send a reply, dropping it if the connection is gone or not reading
    pub fn reply(&self, message: OutgoingMessage) {
        match self.send(message) {
            Ok(()) => {}
            Err(e @ PipeError::Closed(_)) => {
                tracing::debug!(channel_id = %self.channel_id, error = %e, "Dropping reply");
            }
            Err(e @ PipeError::Full(_)) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "Dropping reply");
            }
        }
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("channel_id", &self.channel_id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Serialize an outgoing message
///
/// A result that cannot be serialized is replaced by a relay-failure error with the
/// same id. An error envelope that cannot be serialized terminates the process.
fn encode(message: &OutgoingMessage) -> String {
    match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            metrics::counter!(SERIALIZATION_ERRORS_TOTAL).increment(1);
            tracing::error!(error = %e, message = %message, "Gate serialization error");

            let fallback = match (message.is_error(), message.request_id()) {
                (false, Some(id)) => OutgoingMessage::error(id.clone(), ErrorCode::RelayFailed),
                (false, None) => OutgoingMessage::push_error(
                    message.method.clone().unwrap_or_default(),
                    ErrorCode::RelayFailed.into(),
                ),
                (true, _) => fatal_serialization_error(&e),
            };

            fallback
                .to_json()
                .unwrap_or_else(|e| fatal_serialization_error(&e))
        }
    }
}

fn fatal_serialization_error(error: &serde_json::Error) -> ! {
    tracing::error!(error = %error, "Error envelope is not serializable, exiting");
    std::process::exit(1);
}
