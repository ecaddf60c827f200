//! Individual client connection
//!
//! Manager-side state of one live socket. The socket itself is owned by the
//! connection's task; everything else only sees this handle or a `Pipe`.

use super::Pipe;
use crate::protocol::ChannelId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};

/// Frames queued for the socket writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON message
    Text(String),
    /// Low-level liveness probe
    Ping,
}

/// A single client connection
pub struct Connection {
    /// Unique connection ID
    channel_id: ChannelId,

    /// Peer address for logs and request metadata
    client_ip: String,

    /// Channel to the socket writer
    sender: mpsc::Sender<Outbound>,

    /// Set by the sweep, cleared by any inbound traffic
    awaiting_probe: AtomicBool,

    /// Set once the close/error event has been delivered
    closed: AtomicBool,

    /// Forced termination request
    terminated: AtomicBool,
    terminate: Notify,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    /// Create a new connection
    pub fn new(channel_id: ChannelId, client_ip: String, sender: mpsc::Sender<Outbound>) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            client_ip,
            sender,
            awaiting_probe: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            terminate: Notify::new(),
            created_at: Instant::now(),
        })
    }

    /// Get the connection ID
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Get the client address
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    /// Reply pipe bound to this connection
    pub fn pipe(&self) -> Pipe {
        Pipe::new(self.channel_id, self.sender.clone())
    }

    /// Record inbound traffic (any frame, including pong)
    pub fn mark_alive(&self) {
        self.awaiting_probe.store(false, Ordering::SeqCst);
    }

    /// Flag the connection as pending a probe answer
    ///
    /// Returns `true` if it was already pending, i.e. it missed the previous probe.
    pub fn mark_pending(&self) -> bool {
        self.awaiting_probe.swap(true, Ordering::SeqCst)
    }

    /// Check if the connection has not answered the last probe yet
    pub fn is_pending(&self) -> bool {
        self.awaiting_probe.load(Ordering::SeqCst)
    }

    /// Queue a liveness probe; a full queue skips this probe
    pub fn probe(&self) -> bool {
        self.sender.try_send(Outbound::Ping).is_ok()
    }

    /// Ask the connection's task to drop the socket
    ///
    /// Terminating an already terminated connection is a no-op.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            self.terminate.notify_one();
        }
    }

    /// Check if termination was requested
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once termination is requested
    pub async fn terminated(&self) {
        if self.is_terminated() {
            return;
        }
        self.terminate.notified().await;
    }

    /// Claim the right to deliver the terminal event
    ///
    /// Returns `true` exactly once per connection.
    pub fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("channel_id", &self.channel_id)
            .field("client_ip", &self.client_ip)
            .field("pending", &self.is_pending())
            .field("created_at", &self.created_at)
            .finish()
    }
}
