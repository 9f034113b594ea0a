//! Per-call request options

use crate::core::error::ClientError;
use std::fmt;
use std::time::Duration;

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send + Sync>;
type ErrorCallback = Box<dyn FnOnce(&ClientError) + Send + Sync>;

/// Policies applied to a single `execute` call
///
/// Unset fields fall back to the client's [`RequestConfig`](crate::config::RequestConfig).
///
/// # Example
///
/// ```rust,ignore
/// let options = RequestOptions::new()
///     .retries(2)
///     .retry_delay(Duration::from_millis(100))
///     .cached("goals_all")
///     .cache_ttl(Duration::from_secs(1))
///     .on_error(|e| tracing::warn!(error = %e, "goals failed"));
/// ```
pub struct RequestOptions<T> {
    pub(crate) retries: Option<u32>,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) cache: bool,
    pub(crate) cache_key: Option<String>,
    pub(crate) cache_ttl: Option<Duration>,
    pub(crate) operation_name: Option<String>,
    pub(crate) notify_on_error: bool,
    pub(crate) on_success: Option<SuccessCallback<T>>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl<T> RequestOptions<T> {
    pub fn new() -> Self {
        Self {
            retries: None,
            retry_delay: None,
            cache: false,
            cache_key: None,
            cache_ttl: None,
            operation_name: None,
            notify_on_error: false,
            on_success: None,
            on_error: None,
        }
    }

    /// Additional attempts allowed after the first transient failure
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Base backoff delay; attempt n waits `delay * 2^(n-1)`
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Enable or disable caching; only effective together with a cache key
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Shorthand for `.cache(true).cache_key(key)`
    pub fn cached(self, key: impl Into<String>) -> Self {
        self.cache(true).cache_key(key)
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Stable identity for retry timers of this operation
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Publish a notification (with a retry action) when the call fails
    pub fn notify_on_error(mut self) -> Self {
        self.notify_on_error = true;
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(&ClientError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// The cache key, if caching is effective for this call
    pub(crate) fn effective_cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref().filter(|_| self.cache)
    }
}

impl<T> Default for RequestOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RequestOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("cache", &self.cache)
            .field("cache_key", &self.cache_key)
            .field("cache_ttl", &self.cache_ttl)
            .field("operation_name", &self.operation_name)
            .field("notify_on_error", &self.notify_on_error)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_requires_cache_flag() {
        let options: RequestOptions<()> = RequestOptions::new().cache_key("k");
        assert_eq!(options.effective_cache_key(), None);

        let options: RequestOptions<()> = RequestOptions::new().cache(true);
        assert_eq!(options.effective_cache_key(), None);

        let options: RequestOptions<()> = RequestOptions::new().cached("k");
        assert_eq!(options.effective_cache_key(), Some("k"));
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let options: RequestOptions<u8> = RequestOptions::new().on_success(|_| {});
        let text = format!("{:?}", options);
        assert!(text.contains("on_success: true"));
        assert!(text.contains("on_error: false"));
    }
}
