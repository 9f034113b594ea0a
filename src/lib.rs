//! # Pulse
//!
//! Resilient client core for a dashboard backend: a request pipeline with
//! caching, retries and token refresh, and a realtime push channel that
//! survives network churn.
//!
//! ## Features
//!
//! - **Request pipeline**: TTL response cache, exponential-backoff retries,
//!   one refresh-and-retry on 401, fast-fail while the backend is down
//! - **Connection status**: shared `Connected` / `Disconnected` / `Reconnecting`
//!   state fed by requests and a background health monitor
//! - **Realtime channel**: identity-scoped WebSocket with typed handler
//!   routing, heartbeat paused on hidden pages and bounded reconnects
//! - **Notifications**: broadcast bus with kind-specific default durations
//! - **Configuration**: YAML with defaults and validation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pulse::prelude::*;
//!
//! let store = TokenStore::new();
//! let auth = Arc::new(HttpAuthProvider::new("http://localhost:8000", store.clone()));
//! let config = ClientConfig::default();
//!
//! let client = RequestClient::new(config.request.clone(), auth.clone());
//! let backend = HttpBackend::from_config(&config.request, auth);
//!
//! let goals = client
//!     .execute(|| backend.goals(), RequestOptions::new().cached("goals").retries(2))
//!     .await?;
//!
//! let channel = RealtimeChannel::new(config.realtime.clone());
//! channel.follow_identity(store.subscribe_identity());
//! let feed = InboxFeed::attach(&channel, Some(client.notifications().clone()));
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod realtime;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthProvider, NoAuthProvider, Session, TokenStore},
        error::{ApiError, ClientError, ClientResult, FailureKind},
        notifications::{
            Notification, NotificationAction, NotificationBus, NotificationKind, Priority,
        },
    };

    // === Request pipeline ===
    pub use crate::client::{
        ConnectionStatus, HealthMonitor, HttpAuthProvider, HttpBackend, RequestClient,
        RequestOptions,
    };

    // === Realtime ===
    pub use crate::realtime::{
        ChannelEvent, ChannelState, InboxEvent, InboxFeed, RealtimeChannel, RealtimeMessage,
    };

    // === Config ===
    pub use crate::config::{ClientConfig, NotificationConfig, RealtimeConfig, RequestConfig};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
