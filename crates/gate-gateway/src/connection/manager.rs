//! Connection manager
//!
//! Registry of all live connections using DashMap for thread-safe access, plus
//! the two-strike liveness sweep.

use super::{Connection, Outbound};
use crate::protocol::ChannelId;
use dashmap::DashMap;
use gate_common::metrics::{CONNECTIONS_ACTIVE, EVICTED_TOTAL};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Outgoing queue size per connection
const MESSAGE_BUFFER_SIZE: usize = 100;

/// Result of one liveness sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections terminated for missing the previous probe
    pub evicted: usize,
    /// Connections sent a new probe
    pub probed: usize,
}

/// Manages all live client connections
pub struct ConnectionManager {
    /// Live connections by ID
    connections: DashMap<ChannelId, Arc<Connection>>,

    /// Source of connection IDs; never reused
    next_id: AtomicU64,

    /// Liveness probe interval
    probe_interval: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager
    #[must_use]
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
            probe_interval,
        }
    }

    /// Create a new connection manager wrapped in Arc
    #[must_use]
    pub fn new_shared(probe_interval: Duration) -> Arc<Self> {
        Arc::new(Self::new(probe_interval))
    }

    /// Register a newly accepted connection under a fresh ID
    ///
    /// Returns the connection and the receiving end of its outgoing queue.
    pub fn add_connection(&self, client_ip: String) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let channel_id = ChannelId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let connection = Connection::new(channel_id, client_ip, tx);

        self.connections.insert(channel_id, connection.clone());
        metrics::gauge!(CONNECTIONS_ACTIVE).set(self.connections.len() as f64);

        tracing::debug!(channel_id = %channel_id, "Connection added");

        (connection, rx)
    }

    /// Remove a connection
    ///
    /// Removing an absent connection is a no-op.
    pub fn remove_connection(&self, channel_id: ChannelId) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(&channel_id).map(|(_, c)| c);

        if removed.is_some() {
            metrics::gauge!(CONNECTIONS_ACTIVE).set(self.connections.len() as f64);
            tracing::debug!(channel_id = %channel_id, "Connection removed");
        }

        removed
    }

    /// Check if a connection exists
    pub fn has_connection(&self, channel_id: ChannelId) -> bool {
        self.connections.contains_key(&channel_id)
    }

    /// Get the total number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Liveness probe interval
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Run one liveness sweep
    ///
    /// Connections still pending from the previous sweep are terminated; every
    /// other connection is flagged pending and probed. A terminated connection
    /// stays registered until its socket task has delivered the terminal event
    /// and removed it.
    pub fn sweep(&self) -> SweepReport {
        let snapshot: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .filter(|r| !r.is_terminated())
            .map(|r| r.clone())
            .collect();
        let mut report = SweepReport::default();

        for connection in snapshot {
            if connection.mark_pending() {
                tracing::info!(
                    channel_id = %connection.channel_id(),
                    client_ip = %connection.client_ip(),
                    "Dropping connection that missed a liveness probe"
                );
                connection.terminate();
                report.evicted += 1;
            } else {
                connection.probe();
                report.probed += 1;
            }
        }

        if report.evicted > 0 {
            metrics::counter!(EVICTED_TOTAL).increment(report.evicted as u64);
        }

        tracing::trace!(evicted = report.evicted, probed = report.probed, "Liveness sweep done");

        report
    }

    /// Spawn the periodic liveness sweep
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.probe_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }

    /// Terminate every live connection (shutdown)
    pub fn terminate_all(&self) -> usize {
        let mut count = 0;
        for entry in self.connections.iter() {
            entry.terminate();
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connections.len())
            .field("probe_interval", &self.probe_interval)
            .finish()
    }
}
