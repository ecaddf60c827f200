//! Session broker
//!
//! Single consumer of connection events. Each connection gets one `SessionActor`
//! task owning its authentication state; the broker itself only keeps the routing
//! tables (connection id to session handle, identity to connection ids).

mod actor;
mod error;
mod session;
mod transfer;
mod verify;

pub use error::{HandlerError, HandlerResult};
pub use session::{AuthState, AuthStatus, Challenge, Identity};
pub use transfer::{TransferRoute, TRANSFER_ROUTE};
pub use verify::{
    BackendSignatureVerifier, ChallengeIssuer, SignatureVerifier, Verification, VerificationRequest,
};

use crate::backend::{BackendConnector, InboundRoutes};
use crate::connection::{ConnectionEvent, EventHandler, GateEvent, Pipe};
use crate::protocol::{ChannelId, ErrorCode, OutgoingMessage, RpcError};
use actor::{SessionActor, SessionCommand};
use dashmap::DashMap;
use gate_common::config::{AUTH_SERVICE, FACADE_SERVICE};
use gate_common::{AuthConfig, BackendsConfig};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Commands a session may have queued before further requests are refused
const MAILBOX_SIZE: usize = 64;

/// Broker-side reference to a live session
struct SessionHandle {
    pipe: Pipe,
    mailbox: mpsc::Sender<SessionCommand>,
    /// Last status published by the session's actor
    status: Arc<Mutex<AuthStatus>>,
}

pub(crate) struct BrokerInner {
    sessions: DashMap<ChannelId, SessionHandle>,
    /// Authorized user to its live connections
    identities: DashMap<String, HashSet<ChannelId>>,
    backend: Arc<dyn BackendConnector>,
    verifier: Arc<dyn SignatureVerifier>,
    issuer: ChallengeIssuer,
    auth: AuthConfig,
    /// Namespaces clients may route requests to
    services: BTreeSet<String>,
}

/// Session broker
///
/// Cheap to clone; all clones share the same routing tables.
#[derive(Clone)]
pub struct SessionBroker {
    inner: Arc<BrokerInner>,
}

impl SessionBroker {
    /// Create a broker
    ///
    /// `services` are the namespaces clients may route to. The `auth` namespace is
    /// reserved for the handshake and never routed.
    pub fn new(
        auth: AuthConfig,
        services: impl IntoIterator<Item = String>,
        backend: Arc<dyn BackendConnector>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let services = services
            .into_iter()
            .filter(|service| service != AUTH_SERVICE)
            .collect();
        let issuer = ChallengeIssuer::new(auth.secret_source, backend.clone());

        Self {
            inner: Arc::new(BrokerInner {
                sessions: DashMap::new(),
                identities: DashMap::new(),
                backend,
                verifier,
                issuer,
                auth,
                services,
            }),
        }
    }

    /// Create a broker routing to every configured backend, verifying signatures
    /// through the auth backend
    pub fn from_config(
        auth: AuthConfig,
        backends: &BackendsConfig,
        backend: Arc<dyn BackendConnector>,
    ) -> Self {
        let verifier = Arc::new(BackendSignatureVerifier::new(backend.clone()));
        Self::new(auth, backends.services.keys().cloned(), backend, verifier)
    }

    /// Inbound routes served to backends
    #[must_use]
    pub fn inbound_routes(&self) -> InboundRoutes {
        let mut routes = InboundRoutes::new();
        routes.register(TRANSFER_ROUTE, Arc::new(TransferRoute::new(self.clone())));
        routes
    }

    /// Check if a session exists for a connection
    #[must_use]
    pub fn has_session(&self, channel_id: ChannelId) -> bool {
        self.inner.sessions.contains_key(&channel_id)
    }

    /// Number of live sessions
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Authentication status of a live session
    #[must_use]
    pub fn auth_status(&self, channel_id: ChannelId) -> Option<AuthStatus> {
        self.inner
            .sessions
            .get(&channel_id)
            .map(|handle| *handle.status.lock())
    }

    /// Reply pipe of a live session
    #[must_use]
    pub fn pipe(&self, channel_id: ChannelId) -> Option<Pipe> {
        self.inner
            .sessions
            .get(&channel_id)
            .map(|handle| handle.pipe.clone())
    }

    /// Live connections authorized as `user`
    #[must_use]
    pub fn channels_of(&self, user: &str) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self
            .inner
            .identities
            .get(user)
            .map(|channels| channels.iter().copied().collect())
            .unwrap_or_default();
        channels.sort_unstable();
        channels
    }

    fn open(&self, event: ConnectionEvent) {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let initial = AuthState::initial(self.inner.auth.enabled);
        let status = Arc::new(Mutex::new(initial.status()));

        let handle = SessionHandle {
            pipe: event.pipe.clone(),
            mailbox: tx,
            status: status.clone(),
        };

        if let Some(previous) = self.inner.sessions.insert(event.channel_id, handle) {
            // Ids are never reused, so this only happens on a duplicate open
            tracing::warn!(channel_id = %event.channel_id, "Replacing existing session");
            let _ = previous.mailbox.try_send(SessionCommand::Terminate);
        }

        let actor = SessionActor::new(
            event.channel_id,
            event.client_ip,
            event.pipe,
            initial,
            status,
            rx,
            self.inner.clone(),
        );
        tokio::spawn(actor.run());

        tracing::debug!(channel_id = %event.channel_id, "Session opened");
    }

    fn enqueue(&self, channel_id: ChannelId, command: SessionCommand) {
        let Some(handle) = self.inner.sessions.get(&channel_id) else {
            tracing::warn!(channel_id = %channel_id, "Event for unknown session dropped");
            return;
        };

        match handle.mailbox.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(SessionCommand::Request(request))) => {
                tracing::warn!(
                    channel_id = %channel_id,
                    method = %request.method,
                    "Session busy, request refused"
                );
                let error = RpcError::new(ErrorCode::RelayFailed, "session is busy, retry later");
                handle.pipe.reply(OutgoingMessage::error(request.id, error));
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(channel_id = %channel_id, "Session busy, event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(channel_id = %channel_id, "Event for finished session dropped");
            }
        }
    }

    fn close(&self, channel_id: ChannelId) {
        // Removal is immediate so pushes to this connection fail from here on;
        // the actor finishes the teardown.
        match self.inner.sessions.remove(&channel_id) {
            Some((_, handle)) => {
                // Dropping the handle closes the mailbox even if this does not fit
                let _ = handle.mailbox.try_send(SessionCommand::Terminate);
                tracing::debug!(channel_id = %channel_id, "Session discarded");
            }
            None => {
                tracing::debug!(channel_id = %channel_id, "Close for absent session ignored");
            }
        }
    }
}

impl EventHandler for SessionBroker {
    fn handle_event(&self, event: ConnectionEvent) {
        tracing::trace!(
            channel_id = %event.channel_id,
            event = event.event.name(),
            "Connection event"
        );

        let channel_id = event.channel_id;
        match event.event {
            GateEvent::Open => self.open(event),
            GateEvent::Message(request) => {
                self.enqueue(channel_id, SessionCommand::Request(request));
            }
            GateEvent::Malformed { id, reason } => {
                self.enqueue(channel_id, SessionCommand::Malformed { id, reason });
            }
            GateEvent::Close | GateEvent::Error => self.close(channel_id),
        }
    }
}

impl std::fmt::Debug for SessionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBroker")
            .field("sessions", &self.inner.sessions.len())
            .field("services", &self.inner.services)
            .field("auth_enabled", &self.inner.auth.enabled)
            .finish()
    }
}

impl BrokerInner {
    fn routes_to(&self, service: &str) -> bool {
        self.services.contains(service)
    }

    fn index_identity(&self, user: &str, channel_id: ChannelId) {
        self.identities
            .entry(user.to_string())
            .or_default()
            .insert(channel_id);
    }

    fn unindex_identity(&self, user: &str, channel_id: ChannelId) {
        if let Some(mut channels) = self.identities.get_mut(user) {
            channels.remove(&channel_id);
        }
        self.identities.remove_if(user, |_, channels| channels.is_empty());
    }

    /// Best-effort offline notification; failures are logged and swallowed
    async fn notify_offline(&self, user: &str, channel_id: ChannelId) {
        let payload = json!({ "user": user, "channelId": channel_id });

        match self.backend.call(FACADE_SERVICE, "offline", payload).await {
            Ok(_) => tracing::debug!(user = %user, channel_id = %channel_id, "Offline notified"),
            Err(e) => tracing::warn!(
                user = %user,
                channel_id = %channel_id,
                error = %e,
                "Offline notification failed"
            ),
        }
    }
}
