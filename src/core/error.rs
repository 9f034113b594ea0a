//! Typed error handling for the pulse client
//!
//! Backend calls report failures as [`ApiError`], a small structured value
//! carrying an optional HTTP status and the backend's error text. The request
//! client classifies those failures and surfaces a [`ClientError`] to callers.
//!
//! # Classification
//!
//! The dashboard backend reports errors as free text, and existing callers
//! rely on the following outcomes:
//!
//! | Status / text contains                                   | Kind             |
//! |----------------------------------------------------------|------------------|
//! | `401`, `Unauthorized`                                    | Authentication   |
//! | `500`, `502`, `503`, `NetworkError`, `Failed to fetch`   | Transient        |
//! | anything else (including `429`)                          | Other            |
//!
//! A structured status code is checked first; the text markers are always
//! consulted as well, so an error built from raw text classifies the same way
//! as one built from a response status.
//!
//! # Example
//!
//! ```rust,ignore
//! match client.execute(fetch_goals, RequestOptions::new()).await {
//!     Ok(goals) => println!("{goals:?}"),
//!     Err(ClientError::BackendUnavailable) => println!("offline, try later"),
//!     Err(ClientError::AuthenticationFailed { .. }) => println!("please log in again"),
//!     Err(e) => eprintln!("{} ({})", e, e.error_code()),
//! }
//! ```

use thiserror::Error;

/// Error text markers for authentication failures
const AUTH_MARKERS: &[&str] = &["401", "Unauthorized"];

/// Error text markers for retryable network/server failures
const TRANSIENT_MARKERS: &[&str] = &["NetworkError", "Failed to fetch", "500", "502", "503"];

/// Coarse classification of a failed backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The bearer token was rejected; a refresh may fix it
    Authentication,
    /// Network or server hiccup; retrying may succeed
    Transient,
    /// Anything else; retrying will not help
    Other,
}

/// A failed backend call, as reported by the operation itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Backend error text
    pub message: String,
}

impl ApiError {
    /// Build an error from raw text only
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Build an error from a response status and its text
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Build a transport-level failure (no response was received)
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::new(format!("NetworkError: {}", message))
    }

    /// Classify this failure
    pub fn kind(&self) -> FailureKind {
        match self.status {
            Some(401) => return FailureKind::Authentication,
            Some(500 | 502 | 503) => return FailureKind::Transient,
            _ => {}
        }

        if AUTH_MARKERS.iter().any(|m| self.message.contains(m)) {
            FailureKind::Authentication
        } else if TRANSIENT_MARKERS.iter().any(|m| self.message.contains(m)) {
            FailureKind::Transient
        } else {
            FailureKind::Other
        }
    }

    /// Whether the backend rejected the call for rate limiting
    ///
    /// Rate-limited calls are neither retried nor reported to the user.
    pub fn is_rate_limited(&self) -> bool {
        match self.status {
            Some(status) => status == 429,
            None => self.message.contains("429"),
        }
    }
}

/// The main error type returned by the client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Token refresh failed or was rejected; the session has been logged out
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Fast-fail while the backend is known to be down
    #[error("Backend unavailable: requests are suspended until the connection recovers")]
    BackendUnavailable,

    /// Retryable failure that outlived its retry budget
    #[error("Transient network error after {attempts} attempt(s): {source}")]
    TransientNetwork { attempts: u32, source: ApiError },

    /// Failure that is not worth retrying
    #[error("Request failed: {0}")]
    PermanentRequest(#[source] ApiError),

    /// The realtime channel could not be (re-)established
    #[error("Realtime connection error: {message}")]
    RealtimeConnection { message: String, attempts: u32 },

    /// A server push could not be decoded
    #[error("Malformed realtime message: {message}")]
    MessageParse { message: String },

    /// A scheduled retry was cleared while the call waited on it
    #[error("Request cancelled: pending retry was cleared")]
    Cancelled,

    /// Failed to (de)serialize a payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Stable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            ClientError::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ClientError::TransientNetwork { .. } => "TRANSIENT_NETWORK_ERROR",
            ClientError::PermanentRequest(_) => "PERMANENT_REQUEST_ERROR",
            ClientError::RealtimeConnection { .. } => "REALTIME_CONNECTION_ERROR",
            ClientError::MessageParse { .. } => "MESSAGE_PARSE_ERROR",
            ClientError::Cancelled => "CANCELLED",
            ClientError::Serialization(_) => "SERIALIZATION_ERROR",
            ClientError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller may reasonably try the same call again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::BackendUnavailable
                | ClientError::TransientNetwork { .. }
                | ClientError::RealtimeConnection { .. }
        )
    }

    /// The underlying backend failure, if this error wraps one
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::TransientNetwork { source, .. } => Some(source),
            ClientError::PermanentRequest(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status of the underlying backend failure
    pub fn status(&self) -> Option<u16> {
        self.api_error().and_then(|e| e.status)
    }

    /// Wrap a classified backend failure
    pub(crate) fn from_api(error: ApiError, attempts: u32) -> Self {
        match error.kind() {
            FailureKind::Transient => ClientError::TransientNetwork {
                attempts,
                source: error,
            },
            _ => ClientError::PermanentRequest(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_auth_by_status_and_text() {
        assert_eq!(
            ApiError::with_status(401, "nope").kind(),
            FailureKind::Authentication
        );
        assert_eq!(
            ApiError::new("HTTP 401 Unauthorized").kind(),
            FailureKind::Authentication
        );
        assert_eq!(
            ApiError::new("Unauthorized").kind(),
            FailureKind::Authentication
        );
    }

    #[test]
    fn test_classifies_transient_markers() {
        for text in [
            "NetworkError when attempting to fetch resource",
            "TypeError: Failed to fetch",
            "HTTP 500 Internal Server Error",
            "502 Bad Gateway",
            "503 Service Unavailable",
        ] {
            assert_eq!(ApiError::new(text).kind(), FailureKind::Transient, "{text}");
        }
        assert_eq!(
            ApiError::with_status(503, "down").kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_rate_limit_is_not_transient() {
        let err = ApiError::with_status(429, "429 Too Many Requests");
        assert_eq!(err.kind(), FailureKind::Other);
        assert!(err.is_rate_limited());

        assert!(ApiError::new("HTTP 429").is_rate_limited());
        assert!(!ApiError::with_status(404, "429 items").is_rate_limited());
    }

    #[test]
    fn test_other_errors() {
        assert_eq!(
            ApiError::with_status(404, "404 Not Found").kind(),
            FailureKind::Other
        );
        assert_eq!(ApiError::new("validation failed").kind(), FailureKind::Other);
    }

    #[test]
    fn test_network_constructor_is_transient() {
        let err = ApiError::network("connection refused");
        assert_eq!(err.message, "NetworkError: connection refused");
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[test]
    fn test_from_api_wraps_by_kind() {
        let transient = ClientError::from_api(ApiError::new("NetworkError"), 3);
        assert!(matches!(
            transient,
            ClientError::TransientNetwork { attempts: 3, .. }
        ));
        assert!(transient.is_retryable());

        let permanent = ClientError::from_api(ApiError::with_status(404, "missing"), 1);
        assert_eq!(permanent.error_code(), "PERMANENT_REQUEST_ERROR");
        assert_eq!(permanent.status(), Some(404));
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ClientError::BackendUnavailable.error_code(),
            "BACKEND_UNAVAILABLE"
        );
        assert_eq!(
            ClientError::AuthenticationFailed {
                message: "expired".to_string()
            }
            .error_code(),
            "AUTHENTICATION_FAILED"
        );
        assert_eq!(ClientError::Cancelled.error_code(), "CANCELLED");
    }

    #[test]
    fn test_display_keeps_backend_text() {
        let err = ClientError::PermanentRequest(ApiError::with_status(400, "bad payload"));
        assert_eq!(err.to_string(), "Request failed: bad payload");
    }
}
