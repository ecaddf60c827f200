//! Session authentication state
//!
//! `Anonymous -> ChallengeIssued -> Authorized -> (logout) Anonymous`. With
//! authentication disabled a session starts `Authorized` without an identity.

use super::HandlerError;
use serde::Serialize;
use serde_json::{Map, Value};

/// An outstanding challenge secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    secret: String,
    /// A failed authorize spent the secret
    spent: bool,
}

impl Challenge {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            spent: false,
        }
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.spent
    }
}

/// Who an authorized session is
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// `None` for sessions authorized implicitly (authentication disabled)
    pub user: Option<String>,
    /// Auth context returned by the auth backend, opaque to the gateway
    pub context: Value,
}

impl Identity {
    /// Identity of a session on a gateway without authentication
    #[must_use]
    pub fn implicit() -> Self {
        Self {
            user: None,
            context: Value::Object(Map::new()),
        }
    }

    #[must_use]
    pub fn user(user: impl Into<String>, context: Value) -> Self {
        Self {
            user: Some(user.into()),
            context,
        }
    }
}

/// Observable authentication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStatus {
    Anonymous,
    ChallengeIssued,
    Authorized,
}

/// Per-session authentication state
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Anonymous,
    ChallengeIssued(Challenge),
    Authorized(Identity),
}

impl AuthState {
    /// Initial state for a freshly opened connection
    #[must_use]
    pub fn initial(auth_enabled: bool) -> Self {
        if auth_enabled {
            Self::Anonymous
        } else {
            Self::Authorized(Identity::implicit())
        }
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        match self {
            Self::Anonymous => AuthStatus::Anonymous,
            Self::ChallengeIssued(_) => AuthStatus::ChallengeIssued,
            Self::Authorized(_) => AuthStatus::Authorized,
        }
    }

    #[must_use]
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }

    /// Identity of an authorized session
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authorized(identity) => Some(identity),
            _ => None,
        }
    }

    /// Auth context forwarded to backends; `{}` unless authorized
    #[must_use]
    pub fn auth_context(&self) -> Value {
        self.identity()
            .map_or_else(|| Value::Object(Map::new()), |identity| identity.context.clone())
    }

    /// Store a fresh challenge secret, replacing any previous one
    pub fn issue_challenge(&mut self, secret: impl Into<String>) -> Result<(), HandlerError> {
        if self.is_authorized() {
            return Err(HandlerError::AlreadyAuthorized);
        }
        *self = Self::ChallengeIssued(Challenge::new(secret));
        Ok(())
    }

    /// Secret an authorize attempt must be verified against
    pub fn pending_secret(&self) -> Result<&str, HandlerError> {
        match self {
            Self::Anonymous => Err(HandlerError::AuthorizationDenied(
                "no challenge issued, request a secret first".to_string(),
            )),
            Self::ChallengeIssued(challenge) if challenge.is_spent() => {
                Err(HandlerError::AuthorizationDenied(
                    "challenge already used, request a new secret".to_string(),
                ))
            }
            Self::ChallengeIssued(challenge) => Ok(challenge.secret()),
            Self::Authorized(_) => Err(HandlerError::AlreadyAuthorized),
        }
    }

    /// Successful verification
    pub fn authorize(&mut self, identity: Identity) {
        *self = Self::Authorized(identity);
    }

    /// Failed verification; the session stays `ChallengeIssued`
    pub fn reject(&mut self, retry_same_secret: bool) {
        if let Self::ChallengeIssued(challenge) = self {
            if !retry_same_secret {
                challenge.spent = true;
            }
        }
    }

    /// Drop authorization, returning the identity that was authorized
    pub fn logout(&mut self) -> Option<Identity> {
        match std::mem::replace(self, Self::Anonymous) {
            Self::Authorized(identity) => Some(identity),
            _ => None,
        }
    }
}
