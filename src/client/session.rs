//! Backend-backed session management
//!
//! [`HttpAuthProvider`] implements the token lifecycle against the backend's
//! `/auth/*` endpoints and keeps the session in a shared [`TokenStore`].

use super::http::{join_url, send_json};
use crate::core::auth::{AuthProvider, Session, TokenStore};
use crate::core::error::ApiError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

/// Token payload returned by login/register/refresh
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Value,
}

impl TokenResponse {
    fn user_id(&self) -> Option<String> {
        self.user_id
            .as_ref()
            .or(self.user.as_ref().map(|u| &u.id))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    fn into_session(self) -> Session {
        let user_id = self.user_id();
        let mut session = Session::new(self.access_token);
        session.refresh_token = self.refresh_token;
        session.user_id = user_id;
        session.expires_at = self.expires_in.map(|s| Utc::now() + Duration::seconds(s));
        session
    }
}

/// Auth provider talking to the backend's auth endpoints
#[derive(Clone)]
pub struct HttpAuthProvider {
    http: reqwest::Client,
    base_url: String,
    store: TokenStore,
}

impl HttpAuthProvider {
    pub fn new(base_url: impl Into<String>, store: TokenStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            store,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Log in and store the session
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let body = json!({ "email": email, "password": password });
        self.open_session("/auth/login", &body).await
    }

    /// Create an account and store the resulting session
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Session, ApiError> {
        let body = json!({ "email": email, "password": password, "name": name });
        self.open_session("/auth/register", &body).await
    }

    async fn open_session(&self, path: &str, body: &Value) -> Result<Session, ApiError> {
        let payload = send_json(self.http.post(join_url(&self.base_url, path)).json(body)).await?;
        let tokens: TokenResponse = serde_json::from_value(payload)
            .map_err(|e| ApiError::new(format!("Invalid token response: {}", e)))?;

        let session = tokens.into_session();
        tracing::info!(user_id = ?session.user_id, "Session opened");
        self.store.set(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn current_token(&self) -> Option<String> {
        self.store.access_token()
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or_else(|| ApiError::new("No refresh token available"))?;

        let payload = send_json(
            self.http
                .post(join_url(&self.base_url, "/auth/refresh"))
                .json(&json!({ "refresh_token": refresh_token })),
        )
        .await?;
        let tokens: TokenResponse = serde_json::from_value(payload)
            .map_err(|e| ApiError::new(format!("Invalid token response: {}", e)))?;

        let session = self.store.get();
        let mut refreshed = tokens.into_session();
        if let Some(previous) = session {
            refreshed.refresh_token = refreshed.refresh_token.or(previous.refresh_token);
            refreshed.user_id = refreshed.user_id.or(previous.user_id);
        }

        let access_token = refreshed.access_token.clone();
        self.store.set(refreshed);
        tracing::info!("Access token refreshed");
        Ok(access_token)
    }

    async fn is_authenticated(&self) -> bool {
        self.store.get().is_some_and(|s| !s.is_expired())
    }

    async fn user_id(&self) -> Option<String> {
        self.store.user_id()
    }

    async fn logout(&self) {
        if let Some(token) = self.store.access_token() {
            let request = self
                .http
                .post(join_url(&self.base_url, "/auth/logout"))
                .bearer_auth(token);
            // Best effort: the local session is dropped regardless
            if let Err(e) = send_json(request).await {
                tracing::debug!(error = %e, "Backend logout failed");
            }
        }
        self.store.clear();
        tracing::info!("Logged out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_user_id_variants() {
        let flat: TokenResponse =
            serde_json::from_value(json!({"access_token": "a", "user_id": 42})).unwrap();
        assert_eq!(flat.user_id().as_deref(), Some("42"));

        let nested: TokenResponse = serde_json::from_value(
            json!({"access_token": "a", "user": {"id": "u-7", "email": "x@y.z"}}),
        )
        .unwrap();
        assert_eq!(nested.user_id().as_deref(), Some("u-7"));
    }

    #[test]
    fn test_into_session_sets_expiry() {
        let tokens: TokenResponse = serde_json::from_value(
            json!({"access_token": "a", "refresh_token": "r", "expires_in": 3600}),
        )
        .unwrap();
        let session = tokens.into_session();

        assert_eq!(session.refresh_token.as_deref(), Some("r"));
        assert!(!session.is_expired());
        assert!(session.expires_at.unwrap() > Utc::now() + Duration::minutes(59));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let provider = HttpAuthProvider::new("http://127.0.0.1:9", TokenStore::new());
        provider.store().set(Session::new("a"));

        let err = provider.refresh_token().await.unwrap_err();
        assert!(err.message.contains("No refresh token"));
    }
}
