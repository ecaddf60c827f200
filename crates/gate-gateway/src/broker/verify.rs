//! Challenge secrets and signature verification

use crate::backend::{BackendConnector, BackendError};
use crate::protocol::ChannelId;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gate_common::config::AUTH_SERVICE;
use gate_common::SecretSource;
use rand::RngCore;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Payload binding a claimed identity, its signature and the issued challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub user: String,
    pub sign: String,
    pub secret: String,
    pub channel_id: ChannelId,
}

/// Verification outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Signature is valid; carries the auth context
    Verified(Value),
    /// Signature rejected, or verification could not be completed
    Denied(String),
}

/// Verifies a signature produced off-band by the client's key
#[async_trait]
pub trait SignatureVerifier: Send + Sync + 'static {
    /// Must fail closed: any doubt is `Denied`
    async fn verify(&self, request: &VerificationRequest) -> Verification;
}

/// Verifier delegating to the auth backend's `auth.authorize`
pub struct BackendSignatureVerifier {
    backend: Arc<dyn BackendConnector>,
}

impl BackendSignatureVerifier {
    pub fn new(backend: Arc<dyn BackendConnector>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SignatureVerifier for BackendSignatureVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Verification {
        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(e) => return Verification::Denied(format!("unserializable request: {e}")),
        };

        match self.backend.call(AUTH_SERVICE, "auth.authorize", payload).await {
            Ok(result) => auth_context(&request.user, result),
            Err(BackendError::Remote(error)) => Verification::Denied(error.message),
            Err(e) => {
                tracing::warn!(
                    channel_id = %request.channel_id,
                    error = %e,
                    "Signature verification unavailable"
                );
                Verification::Denied("verification unavailable".to_string())
            }
        }
    }
}

/// Interpret the auth backend's answer
///
/// An object is the auth context (the claimed user is added if absent); `true`
/// means verified with a bare context; anything else is a denial.
fn auth_context(user: &str, result: Value) -> Verification {
    match result {
        Value::Object(mut context) => {
            context
                .entry("user")
                .or_insert_with(|| Value::String(user.to_string()));
            Verification::Verified(Value::Object(context))
        }
        Value::Bool(true) => Verification::Verified(json!({ "user": user })),
        _ => Verification::Denied("signature rejected".to_string()),
    }
}

/// Issues one-time challenge secrets
pub struct ChallengeIssuer {
    source: SecretSource,
    backend: Arc<dyn BackendConnector>,
}

impl ChallengeIssuer {
    pub fn new(source: SecretSource, backend: Arc<dyn BackendConnector>) -> Self {
        Self { source, backend }
    }

    /// Produce a fresh secret for a connection
    pub async fn issue(&self, channel_id: ChannelId) -> Result<String, BackendError> {
        match self.source {
            SecretSource::Local => Ok(local_secret()),
            SecretSource::Backend => {
                let result = self
                    .backend
                    .call(
                        AUTH_SERVICE,
                        "auth.generateSecret",
                        json!({ "channelId": channel_id }),
                    )
                    .await?;

                match result {
                    Value::String(secret) if !secret.is_empty() => Ok(secret),
                    Value::Object(ref object) => object
                        .get("secret")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .ok_or_else(|| BackendError::Decode("secret missing".to_string())),
                    _ => Err(BackendError::Decode("secret missing".to_string())),
                }
            }
        }
    }
}

/// 32 random bytes, base64url encoded
fn local_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
