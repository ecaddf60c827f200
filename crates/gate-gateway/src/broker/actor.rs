//! Per-connection session task
//!
//! One actor owns one session's `AuthState` and processes that connection's
//! commands in arrival order. Routed requests are handed to independent tasks
//! so a slow backend never stalls the handshake or other requests.

use super::{
    AuthState, AuthStatus, BrokerInner, HandlerError, HandlerResult, Identity, Verification,
    VerificationRequest,
};
use crate::backend::BackendError;
use crate::connection::Pipe;
use crate::protocol::{ChannelId, IncomingRequest, MethodName, OutgoingMessage};
use gate_common::metrics::{AUTH_DURATION_SECONDS, RELAY_ERRORS_TOTAL, REQUESTS_TOTAL};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const GENERATE_SECRET: &str = "auth.generateSecret";
const AUTHORIZE: &str = "auth.authorize";
const LOGOUT: &str = "auth.logout";

/// Unsolicited challenge method
const SIGN: &str = "sign";

/// Work queued for a session
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Request(IncomingRequest),
    Malformed { id: Option<Value>, reason: String },
    Terminate,
}

pub(crate) struct SessionActor {
    channel_id: ChannelId,
    client_ip: String,
    pipe: Pipe,
    state: AuthState,
    status: Arc<Mutex<AuthStatus>>,
    mailbox: mpsc::Receiver<SessionCommand>,
    broker: Arc<BrokerInner>,
}

impl SessionActor {
    pub(crate) fn new(
        channel_id: ChannelId,
        client_ip: String,
        pipe: Pipe,
        state: AuthState,
        status: Arc<Mutex<AuthStatus>>,
        mailbox: mpsc::Receiver<SessionCommand>,
        broker: Arc<BrokerInner>,
    ) -> Self {
        Self {
            channel_id,
            client_ip,
            pipe,
            state,
            status,
            mailbox,
            broker,
        }
    }

    /// Run until the connection closes
    pub(crate) async fn run(mut self) {
        if self.broker.auth.enabled {
            self.push_challenge().await;
        }

        while let Some(command) = self.mailbox.recv().await {
            match command {
                SessionCommand::Request(request) => self.handle_request(request).await,
                SessionCommand::Malformed { id, reason } => self.handle_malformed(id, reason),
                SessionCommand::Terminate => break,
            }
        }

        self.terminate().await;
    }

    async fn handle_request(&mut self, request: IncomingRequest) {
        metrics::counter!(REQUESTS_TOTAL).increment(1);

        if !self.pipe.is_open() {
            tracing::debug!(
                channel_id = %self.channel_id,
                method = %request.method,
                "Skipping request of closed connection"
            );
            return;
        }

        tracing::debug!(
            channel_id = %self.channel_id,
            method = %request.method,
            "Handling request"
        );

        match request.method.as_str() {
            GENERATE_SECRET => {
                let result = self.generate_secret().await;
                respond(&self.pipe, request.id, result);
            }
            AUTHORIZE => {
                let result = self.authorize(&request).await;
                respond(&self.pipe, request.id, result);
            }
            LOGOUT => {
                self.logout().await;
                respond(&self.pipe, request.id, Ok(Value::Bool(true)));

                if self.broker.auth.enabled {
                    self.push_challenge().await;
                }
            }
            _ => self.route(request),
        }
    }

    fn handle_malformed(&self, id: Option<Value>, reason: String) {
        match id {
            Some(id) => respond(&self.pipe, id, Err(HandlerError::InvalidRequest(reason))),
            None => {
                tracing::debug!(
                    channel_id = %self.channel_id,
                    reason = %reason,
                    "Malformed frame without id dropped"
                );
            }
        }
    }

    // === Authentication ===

    /// Issue a fresh challenge and send it as an unsolicited `sign` message
    async fn push_challenge(&mut self) {
        match self.issue_challenge().await {
            Ok(secret) => {
                self.pipe
                    .reply(OutgoingMessage::notify(SIGN, json!({ "secret": secret })));
            }
            Err(e) => {
                // Session stays usable; the client may ask for a secret itself
                tracing::error!(
                    channel_id = %self.channel_id,
                    error = %e,
                    "Failed to issue challenge"
                );
            }
        }
    }

    async fn issue_challenge(&mut self) -> HandlerResult<String> {
        if self.state.is_authorized() {
            return Err(HandlerError::AlreadyAuthorized);
        }

        let secret = self.broker.issuer.issue(self.channel_id).await?;
        self.state.issue_challenge(secret.clone())?;
        self.publish_status();

        Ok(secret)
    }

    async fn generate_secret(&mut self) -> HandlerResult<Value> {
        let secret = self.issue_challenge().await?;
        Ok(json!({ "secret": secret }))
    }

    async fn authorize(&mut self, request: &IncomingRequest) -> HandlerResult<Value> {
        let user = required_string(request, "user")?;
        let sign = required_string(request, "sign")?;
        let secret = self.state.pending_secret()?.to_string();

        let verification = VerificationRequest {
            user: user.clone(),
            sign,
            secret,
            channel_id: self.channel_id,
        };

        let started = Instant::now();
        let outcome = self.broker.verifier.verify(&verification).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Verification::Verified(context) => {
                metrics::histogram!(AUTH_DURATION_SECONDS, "outcome" => "success").record(elapsed);

                self.state.authorize(Identity::user(user.clone(), context.clone()));
                self.broker.index_identity(&user, self.channel_id);
                self.publish_status();

                tracing::info!(channel_id = %self.channel_id, user = %user, "Session authorized");
                Ok(context)
            }
            Verification::Denied(reason) => {
                metrics::histogram!(AUTH_DURATION_SECONDS, "outcome" => "failure").record(elapsed);

                self.state.reject(self.broker.auth.retry_same_secret);
                self.publish_status();

                tracing::info!(
                    channel_id = %self.channel_id,
                    user = %user,
                    reason = %reason,
                    "Authorization denied"
                );
                Err(HandlerError::AuthorizationDenied(reason))
            }
        }
    }

    async fn logout(&mut self) {
        if let Some(user) = self.state.logout().and_then(|identity| identity.user) {
            self.broker.unindex_identity(&user, self.channel_id);
            self.broker.notify_offline(&user, self.channel_id).await;
            tracing::info!(channel_id = %self.channel_id, user = %user, "Session logged out");
        }

        if !self.broker.auth.enabled {
            self.state = AuthState::initial(false);
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        *self.status.lock() = self.state.status();
    }

    // === Routing ===

    fn route(&self, request: IncomingRequest) {
        let (service, payload) = match self.prepare_route(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                respond(&self.pipe, request.id, Err(e));
                return;
            }
        };

        let backend = self.broker.backend.clone();
        let pipe = self.pipe.clone();

        tokio::spawn(async move {
            let result = backend
                .call(&service, &request.method, payload)
                .await
                .map_err(HandlerError::from);
            respond(&pipe, request.id, result);
        });
    }

    /// Resolve the target service and build the routed payload
    fn prepare_route(&self, request: &IncomingRequest) -> HandlerResult<(String, Value)> {
        let method = MethodName::parse(&request.method)
            .map_err(|e| HandlerError::MethodNotFound(e.to_string()))?;

        if !self.state.is_authorized() && !self.broker.auth.allows_anonymous(method.as_str()) {
            return Err(HandlerError::AccessDenied(format!(
                "`{method}` requires an authorized session"
            )));
        }

        if !self.broker.routes_to(method.service()) {
            return Err(HandlerError::ServiceNotFound(format!(
                "no backend for `{}`",
                method.service()
            )));
        }

        let user = self.state.identity().and_then(|identity| identity.user.clone());
        let payload = json!({
            "_frontendGate": true,
            "user": user,
            "auth": self.state.auth_context(),
            "routing": {
                "requestId": request.id,
                "channelId": self.channel_id,
            },
            "meta": {
                "clientRequestIp": self.client_ip,
            },
            "params": request.params,
        });

        Ok((method.service().to_string(), payload))
    }

    // === Teardown ===

    async fn terminate(self) {
        if let Some(user) = self.state.identity().and_then(|identity| identity.user.clone()) {
            self.broker.unindex_identity(&user, self.channel_id);
            self.broker.notify_offline(&user, self.channel_id).await;
        }

        tracing::debug!(channel_id = %self.channel_id, "Session terminated");
    }
}

/// Send the outcome of a request, echoing its id
fn respond(pipe: &Pipe, id: Value, result: HandlerResult<Value>) {
    let message = match result {
        Ok(result) => OutgoingMessage::response(id, result),
        Err(error) => {
            report(pipe.channel_id(), &error);
            OutgoingMessage::error(id, error)
        }
    };

    pipe.reply(message);
}

fn report(channel_id: ChannelId, error: &HandlerError) {
    match error {
        HandlerError::Backend(BackendError::Remote(remote)) => {
            tracing::debug!(channel_id = %channel_id, code = remote.code, "Backend answered with error");
        }
        HandlerError::Backend(e) => {
            metrics::counter!(RELAY_ERRORS_TOTAL).increment(1);
            tracing::error!(
                channel_id = %channel_id,
                error = %e,
                "Fail to pass data from client to backend"
            );
        }
        other => {
            tracing::debug!(channel_id = %channel_id, error = %other, "Request rejected");
        }
    }
}

/// A non-empty string parameter
fn required_string(request: &IncomingRequest, name: &str) -> HandlerResult<String> {
    match request.param(name) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => Err(HandlerError::InvalidParams(format!("`{name}` is empty"))),
        Some(_) => Err(HandlerError::InvalidParams(format!("`{name}` must be a string"))),
        None => Err(HandlerError::InvalidParams(format!("`{name}` is required"))),
    }
}
