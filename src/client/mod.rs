//! Authenticated request client
//!
//! [`RequestClient`] executes bound backend calls with the cross-cutting
//! policies every dashboard feature needs: response caching with a TTL, a
//! connection-status gate that fails fast while the backend is down, a single
//! silent token refresh on authentication failures, and exponential-backoff
//! retries for transient failures.
//!
//! # Flow
//!
//! ```text
//! execute(op, options)
//!   │
//!   ├─ fresh cache entry? ──────────────▶ return cached
//!   ├─ status == Disconnected? ─────────▶ BackendUnavailable
//!   └─ op(args)
//!        ├─ Ok ─────────────────────────▶ Connected, cache, return
//!        ├─ 401 ─▶ refresh ─┬─ ok ─▶ op(args) once ─▶ return / propagate
//!        │                  └─ err ─▶ logout, "session expired", AuthenticationFailed
//!        ├─ transient, budget left ─────▶ Reconnecting, backoff timer, retry
//!        └─ otherwise ──────────────────▶ Disconnected, (notify), propagate
//! ```
//!
//! Concurrent calls sharing a cache key are not de-duplicated: two misses in
//! flight both run the operation and the later completion wins the slot.

pub mod cache;
pub mod health;
pub mod http;
pub mod options;
pub mod retry;
pub mod session;

pub use cache::ResponseCache;
pub use health::HealthMonitor;
pub use http::HttpBackend;
pub use options::RequestOptions;
pub use session::HttpAuthProvider;

use crate::config::RequestConfig;
use crate::core::auth::AuthProvider;
use crate::core::error::{ApiError, ClientError, ClientResult, FailureKind};
use crate::core::notifications::NotificationBus;
use retry::{RetryTimers, backoff_delay};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

/// Backend reachability as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Executes backend operations with retry, refresh and caching policies
pub struct RequestClient {
    config: RequestConfig,
    auth: Arc<dyn AuthProvider>,
    notifications: NotificationBus,
    cache: ResponseCache,
    status: watch::Sender<ConnectionStatus>,
    health_payload: RwLock<Option<Value>>,
    timers: RetryTimers,
    closed: AtomicBool,
}

impl RequestClient {
    /// Create a client; status starts as `Connected`
    pub fn new(config: RequestConfig, auth: Arc<dyn AuthProvider>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Connected);
        Self {
            config,
            auth,
            notifications: NotificationBus::default(),
            cache: ResponseCache::new(),
            status,
            health_payload: RwLock::new(None),
            timers: RetryTimers::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Publish session/API notifications on a shared bus
    pub fn with_notifications(mut self, notifications: NotificationBus) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    /// Execute a zero-argument operation
    pub async fn execute<T, F, Fut>(
        &self,
        operation: F,
        options: RequestOptions<T>,
    ) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        T: Serialize + DeserializeOwned,
    {
        self.execute_with_args(|()| operation(), (), options).await
    }

    /// Execute an operation, forwarding a clone of `args` on every attempt
    pub async fn execute_with_args<A, T, F, Fut>(
        &self,
        operation: F,
        args: A,
        mut options: RequestOptions<T>,
    ) -> ClientResult<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        T: Serialize + DeserializeOwned,
    {
        let outcome = self.run(&operation, &args, &options).await;

        match &outcome {
            Ok(value) => {
                if let Some(callback) = options.on_success.take() {
                    callback(value);
                }
            }
            Err(error) => {
                if let Some(callback) = options.on_error.take() {
                    callback(error);
                }
            }
        }

        outcome
    }

    async fn run<A, T, F, Fut>(
        &self,
        operation: &F,
        args: &A,
        options: &RequestOptions<T>,
    ) -> ClientResult<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        T: Serialize + DeserializeOwned,
    {
        let cache_key = options.effective_cache_key();
        let cache_ttl = options.cache_ttl.unwrap_or_else(|| self.config.cache_ttl());

        if let Some(key) = cache_key
            && let Some(data) = self.cache.get(key, cache_ttl)
        {
            tracing::debug!(cache_key = %key, "Serving cached response");
            return Ok(serde_json::from_value(data)?);
        }

        if self.status() == ConnectionStatus::Disconnected {
            tracing::debug!("Backend marked disconnected, failing fast");
            return Err(ClientError::BackendUnavailable);
        }

        let retries = options.retries.unwrap_or(self.config.retries);
        let base_delay = options
            .retry_delay
            .unwrap_or_else(|| self.config.retry_delay());
        let operation_name = options
            .operation_name
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let mut attempt: u32 = 0;
        loop {
            let error = match operation(args.clone()).await {
                Ok(value) => return self.complete(value, cache_key),
                Err(error) => error,
            };

            match error.kind() {
                FailureKind::Authentication => {
                    return self
                        .refresh_and_retry(operation, args, cache_key, error, attempt + 1)
                        .await;
                }
                FailureKind::Transient if self.closed.load(Ordering::Acquire) => {
                    tracing::debug!(operation = %operation_name, "Client shut down, not retrying");
                    return Err(ClientError::Cancelled);
                }
                FailureKind::Transient if attempt < retries => {
                    attempt += 1;
                    let delay = backoff_delay(base_delay, attempt);
                    self.set_status(ConnectionStatus::Reconnecting);
                    tracing::warn!(
                        operation = %operation_name,
                        attempt,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, scheduling retry"
                    );
                    self.timers
                        .wait(RetryTimers::key(&operation_name, attempt), delay)
                        .await?;
                }
                _ => return Err(self.fail(error, attempt + 1, options, &operation_name)),
            }
        }
    }

    async fn refresh_and_retry<A, T, F, Fut>(
        &self,
        operation: &F,
        args: &A,
        cache_key: Option<&str>,
        rejected: ApiError,
        attempts: u32,
    ) -> ClientResult<T>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        T: Serialize + DeserializeOwned,
    {
        tracing::info!(error = %rejected, "Token rejected, attempting refresh");

        match self.auth.refresh_token().await {
            Ok(_) => match operation(args.clone()).await {
                Ok(value) => self.complete(value, cache_key),
                Err(error) => {
                    tracing::warn!(error = %error, "Request failed again after token refresh");
                    Err(ClientError::from_api(error, attempts + 1))
                }
            },
            Err(refresh_error) => {
                tracing::warn!(error = %refresh_error, "Token refresh failed, logging out");
                self.auth.logout().await;
                self.notifications.session_expired();
                Err(ClientError::AuthenticationFailed {
                    message: refresh_error.message,
                })
            }
        }
    }

    fn complete<T: Serialize>(&self, value: T, cache_key: Option<&str>) -> ClientResult<T> {
        self.set_status(ConnectionStatus::Connected);

        if let Some(key) = cache_key
            && !self.closed.load(Ordering::Acquire)
        {
            self.cache.insert(key, serde_json::to_value(&value)?);
        }

        Ok(value)
    }

    fn fail<T>(
        &self,
        error: ApiError,
        attempts: u32,
        options: &RequestOptions<T>,
        operation_name: &str,
    ) -> ClientError {
        self.set_status(ConnectionStatus::Disconnected);

        let error = ClientError::from_api(error, attempts);
        tracing::warn!(
            operation = %operation_name,
            attempts,
            code = error.error_code(),
            error = %error,
            "Request failed"
        );

        if options.notify_on_error {
            self.notifications.api_error(&error, Some(operation_name));
        }

        error
    }

    /// Run a health probe and update the status from its outcome
    pub async fn check_health<F, Fut>(&self, probe: F) -> ConnectionStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        let (status, payload) = match probe().await {
            Ok(payload) => (ConnectionStatus::Connected, Some(payload)),
            Err(error) => {
                tracing::debug!(error = %error, "Health check failed");
                (ConnectionStatus::Disconnected, None)
            }
        };

        *self
            .health_payload
            .write()
            .unwrap_or_else(PoisonError::into_inner) = payload;
        self.set_status(status);
        status
    }

    /// Payload of the last successful health probe
    pub fn health_payload(&self) -> Option<Value> {
        self.health_payload
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(status = ?status, "Connection status changed");
        }
    }

    /// Remove cached responses whose key matches `pattern` (all when `None`)
    pub fn clear_cache(&self, pattern: Option<&str>) -> usize {
        self.cache.clear(pattern)
    }

    /// Keys of cached responses still fresh under the default TTL
    pub fn cached_keys(&self) -> Vec<String> {
        self.cache.keys(self.config.cache_ttl())
    }

    /// Number of retry timers currently scheduled
    pub fn pending_retries(&self) -> usize {
        self.timers.pending()
    }

    /// Tear down: cancel scheduled retries and stop writing to the cache
    ///
    /// In-flight operations are not aborted, but no new retry is scheduled
    /// afterwards; calls waiting on a retry timer, or failing transiently
    /// after teardown, resolve to [`ClientError::Cancelled`].
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let cancelled = self.timers.clear();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending retry timers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::NoAuthProvider;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn client() -> RequestClient {
        RequestClient::new(RequestConfig::default(), Arc::new(NoAuthProvider))
    }

    #[tokio::test]
    async fn test_success_marks_connected() {
        let client = client();
        client.set_status(ConnectionStatus::Reconnecting);

        let value = client
            .execute(|| async { Ok::<_, ApiError>(json!({"ok": true})) }, RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(client.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_args_are_forwarded() {
        let client = client();

        let value: String = client
            .execute_with_args(
                |(goal, page): (String, u32)| async move {
                    Ok::<_, ApiError>(format!("{goal}:{page}"))
                },
                ("followers".to_string(), 2),
                RequestOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(value, "followers:2");
    }

    #[tokio::test]
    async fn test_permanent_error_disconnects() {
        let client = client();
        let mut status_rx = client.subscribe_status();

        let err = client
            .execute(
                || async { Err::<Value, _>(ApiError::with_status(404, "404 Not Found")) },
                RequestOptions::new().retries(3),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::PermanentRequest(_)));
        assert_eq!(err.status(), Some(404));
        status_rx.changed().await.unwrap();
        assert_eq!(*status_rx.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let client = client();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let err = client
            .execute(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<Value, _>(ApiError::with_status(429, "429 Too Many Requests")) }
                },
                RequestOptions::new().retries(3).retry_delay(Duration::from_millis(1)),
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ClientError::PermanentRequest(_)));
    }

    #[tokio::test]
    async fn test_callbacks_fire_once_for_outcome() {
        let client = client();
        let successes = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(AtomicU32::new(0));

        let (s, e) = (successes.clone(), errors.clone());
        client
            .execute(
                || async { Ok::<_, ApiError>(1u32) },
                RequestOptions::new()
                    .on_success(move |v| {
                        assert_eq!(*v, 1);
                        s.fetch_add(1, Ordering::SeqCst);
                    })
                    .on_error(move |_| {
                        e.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .await
            .unwrap();

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_notify_on_error_publishes() {
        let bus = NotificationBus::new(8);
        let mut rx = bus.subscribe();
        let client = client().with_notifications(bus);

        let _ = client
            .execute(
                || async { Err::<Value, _>(ApiError::with_status(400, "bad request")) },
                RequestOptions::new()
                    .operation_name("save_goal")
                    .notify_on_error(),
            )
            .await;

        let n = rx.recv().await.unwrap();
        assert_eq!(n.action.unwrap().action_id, "save_goal");
    }

    #[tokio::test]
    async fn test_check_health_updates_status_and_payload() {
        let client = client();

        let status = client
            .check_health(|| async { Err::<Value, _>(ApiError::network("refused")) })
            .await;
        assert_eq!(status, ConnectionStatus::Disconnected);
        assert!(client.health_payload().is_none());

        let status = client
            .check_health(|| async { Ok::<_, ApiError>(json!({"status": "healthy"})) })
            .await;
        assert_eq!(status, ConnectionStatus::Connected);
        assert_eq!(client.health_payload().unwrap()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_shutdown_stops_cache_writes() {
        let client = client();
        client.shutdown();

        client
            .execute(|| async { Ok::<_, ApiError>(5u8) }, RequestOptions::new().cached("k"))
            .await
            .unwrap();

        assert!(client.cached_keys().is_empty());
    }
}
