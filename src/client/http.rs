//! reqwest-backed access to the dashboard REST API
//!
//! Every call injects the current bearer token from the [`AuthProvider`] and
//! reports failures as [`ApiError`]. Error text is `"<code> <reason>: <detail>"`
//! so that text-based classification agrees with the structured status.

use crate::config::RequestConfig;
use crate::core::auth::AuthProvider;
use crate::core::error::ApiError;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Thin JSON client for the backend
#[derive(Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    health_path: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            health_path: "/health".to_string(),
            auth,
        }
    }

    pub fn from_config(config: &RequestConfig, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            health_path: config.health_path.clone(),
            ..Self::new(config.base_url.clone(), auth)
        }
    }

    /// Reuse an existing reqwest client (connection pool, proxies, TLS)
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(self.request(Method::DELETE, path)).await
    }

    /// Lightweight liveness probe
    pub async fn health(&self) -> Result<Value, ApiError> {
        self.get_json(&self.health_path).await
    }

    pub async fn content(&self) -> Result<Value, ApiError> {
        self.get_json("/content").await
    }

    pub async fn goals(&self) -> Result<Value, ApiError> {
        self.get_json("/goals").await
    }

    pub async fn analytics(&self, period: &str) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, "/analytics").query(&[("period", period)]))
            .await
    }

    pub async fn notifications(&self) -> Result<Value, ApiError> {
        self.get_json("/notifications").await
    }

    pub async fn workflows(&self) -> Result<Value, ApiError> {
        self.get_json("/workflow").await
    }

    pub async fn memory(&self) -> Result<Value, ApiError> {
        self.get_json("/memory").await
    }

    pub async fn settings(&self) -> Result<Value, ApiError> {
        self.get_json("/settings").await
    }

    pub async fn me(&self) -> Result<Value, ApiError> {
        self.get_json("/auth/me").await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, join_url(&self.base_url, path))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let builder = match self.auth.current_token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        };
        send_json(builder).await
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send a request and decode a JSON body, mapping failures to [`ApiError`]
pub(crate) async fn send_json(builder: RequestBuilder) -> Result<Value, ApiError> {
    let response = builder.send().await.map_err(ApiError::network)?;
    let status = response.status();
    let text = response.text().await.map_err(ApiError::network)?;

    if !status.is_success() {
        return Err(status_error(status, &text));
    }

    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| {
        ApiError::with_status(status.as_u16(), format!("Invalid JSON response: {}", e))
    })
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    // FastAPI-style bodies carry the message under "detail"
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("message"))
                .and_then(|d| d.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string());

    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    let message = if detail.is_empty() {
        format!("{} {}", code, reason)
    } else {
        format!("{} {}: {}", code, reason, detail)
    };

    tracing::debug!(status = code, message = %message, "Backend returned an error");
    ApiError::with_status(code, message)
}
