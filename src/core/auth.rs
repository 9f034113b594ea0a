//! Token lifecycle seam for pulse
//!
//! The request client never owns credentials. It asks an [`AuthProvider`] for
//! the current bearer token on every attempt, asks it to refresh once when the
//! backend rejects a token, and asks it to log out when refreshing fails.
//!
//! [`TokenStore`] is the in-process session holder shared by providers. It
//! also broadcasts the authenticated identity so the realtime channel can
//! follow logins and logouts.

use crate::core::error::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token sent with every request
    pub access_token: String,

    /// Token used to obtain a new access token, if the backend issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Identity of the logged-in user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When the access token stops being valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session with only an access token
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user_id: None,
            expires_at: None,
        }
    }

    /// Attach the user identity
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach a refresh token
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Attach an expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check whether the access token has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Source of bearer tokens for the request client
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The token to attach to the next request, if any
    async fn current_token(&self) -> Option<String>;

    /// Obtain a fresh token, replacing the current one wholesale
    async fn refresh_token(&self) -> Result<String, ApiError>;

    /// Whether a session is currently held
    async fn is_authenticated(&self) -> bool;

    /// Identity of the logged-in user
    async fn user_id(&self) -> Option<String>;

    /// Drop the session
    async fn logout(&self);
}

/// Anonymous access: no token, refresh always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn current_token(&self) -> Option<String> {
        None
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        Err(ApiError::new("No session to refresh"))
    }

    async fn is_authenticated(&self) -> bool {
        false
    }

    async fn user_id(&self) -> Option<String> {
        None
    }

    async fn logout(&self) {}
}

/// Shared in-memory holder for the current session
///
/// Cheap to clone; all clones see the same session.
#[derive(Debug, Clone)]
pub struct TokenStore {
    session: Arc<RwLock<Option<Session>>>,
    identity: Arc<watch::Sender<Option<String>>>,
}

impl TokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            session: Arc::new(RwLock::new(None)),
            identity: Arc::new(identity),
        }
    }

    /// Replace the session
    pub fn set(&self, session: Session) {
        let user_id = session.user_id.clone();
        self.with_session(|slot| *slot = Some(session));
        self.publish_identity(user_id);
    }

    /// Drop the session
    pub fn clear(&self) {
        self.with_session(|slot| *slot = None);
        self.publish_identity(None);
    }

    /// Snapshot of the session
    pub fn get(&self) -> Option<Session> {
        self.with_session(|slot| slot.clone())
    }

    /// The current access token
    pub fn access_token(&self) -> Option<String> {
        self.with_session(|slot| slot.as_ref().map(|s| s.access_token.clone()))
    }

    /// The current refresh token
    pub fn refresh_token(&self) -> Option<String> {
        self.with_session(|slot| slot.as_ref().and_then(|s| s.refresh_token.clone()))
    }

    /// The current user identity
    pub fn user_id(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    /// Watch the authenticated identity (`None` when logged out)
    pub fn subscribe_identity(&self) -> watch::Receiver<Option<String>> {
        self.identity.subscribe()
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Option<Session>) -> R) -> R {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut *guard)
    }

    fn publish_identity(&self, user_id: Option<String>) {
        self.identity.send_if_modified(|current| {
            if *current == user_id {
                false
            } else {
                *current = user_id;
                true
            }
        });
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
