//! Gateway state
//!
//! Application state for the client-facing server.

use crate::connection::{Connection, ConnectionEvent, ConnectionManager, EventHandler, GateEvent};
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Connection manager for WebSocket connections
    connection_manager: Arc<ConnectionManager>,
    /// Single consumer of connection events
    events: Arc<dyn EventHandler>,
    /// Maximum accepted inbound frame size
    max_message_bytes: usize,
}

impl GatewayState {
    /// Create a new gateway state
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        events: Arc<dyn EventHandler>,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            connection_manager,
            events,
            max_message_bytes,
        }
    }

    /// Get the connection manager
    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Deliver an event for a connection to the event handler
    pub fn emit(&self, connection: &Connection, event: GateEvent) {
        self.events.handle_event(ConnectionEvent {
            channel_id: connection.channel_id(),
            client_ip: connection.client_ip().to_string(),
            pipe: connection.pipe(),
            event,
        });
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("connection_manager", &self.connection_manager)
            .field("max_message_bytes", &self.max_message_bytes)
            .finish()
    }
}
