//! Process-wide notification dispatch
//!
//! The NotificationBus is a one-way fan-out of toast-style notifications. Any
//! part of the client can raise one; presentation layers subscribe and own the
//! list of notifications currently on screen.
//!
//! # Architecture
//!
//! ```text
//! RequestClient (api errors, session expiry) ──┐
//! InboxFeed (server-pushed notifications) ─────┼──▶ NotificationBus::publish() ──▶ subscribers
//! Application code (milestones, alerts) ───────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = NotificationBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.goal_milestone("Grow followers", 50);
//!
//! if let Ok(notification) = rx.recv().await {
//!     println!("{}: {}", notification.title, notification.message);
//! }
//! ```

use crate::config::NotificationConfig;
use crate::core::error::ClientError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Visual category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Urgency hint for presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// A button attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Button label
    pub label: String,
    /// Identifier the presentation layer routes back to the producer
    pub action_id: String,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action_id: action_id.into(),
        }
    }

    /// The standard "Retry" action
    pub fn retry(action_id: impl Into<String>) -> Self {
        Self::new("Retry", action_id)
    }
}

/// A single notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Auto-dismiss delay; ignored for persistent notifications
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
    /// Stays on screen until dismissed by the user
    #[serde(default)]
    pub persistent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with an explicit duration
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            duration,
            priority: None,
            action: None,
            persistent: false,
            metadata: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// The only mutation a notification ever undergoes
    pub fn mark_read(&mut self) {
        self.is_read = true;
    }
}

/// Broadcast-based notification bus
///
/// Cheap to clone (the sender is reference counted). Publishing never fails;
/// with no subscribers the notification is simply dropped.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
    config: NotificationConfig,
}

impl NotificationBus {
    /// Create a bus with the given channel capacity and default durations
    pub fn new(capacity: usize) -> Self {
        Self::with_config(NotificationConfig {
            capacity,
            ..NotificationConfig::default()
        })
    }

    /// Create a bus sized and timed from configuration
    pub fn with_config(config: NotificationConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity.max(1));
        Self { sender, config }
    }

    /// Configuration the bus was built from
    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Publish a notification to all subscribers
    ///
    /// Returns the number of subscribers that will receive it.
    pub fn publish(&self, notification: Notification) -> usize {
        tracing::debug!(
            notification_id = %notification.id,
            kind = ?notification.kind,
            title = %notification.title,
            "Publishing notification"
        );
        self.sender.send(notification).unwrap_or(0)
    }

    /// Subscribe to future notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Current number of subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Default auto-dismiss delay for a kind
    pub fn default_duration(&self, kind: NotificationKind) -> Duration {
        let ms = match kind {
            NotificationKind::Success => self.config.success_ms,
            NotificationKind::Info => self.config.info_ms,
            NotificationKind::Warning => self.config.warning_ms,
            NotificationKind::Error => self.config.error_ms,
        };
        Duration::from_millis(ms)
    }

    /// Build a notification of `kind` with its default duration
    pub fn build(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        Notification::new(kind, title, message, self.default_duration(kind))
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> usize {
        self.publish(self.build(NotificationKind::Success, title, message))
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> usize {
        self.publish(self.build(NotificationKind::Info, title, message))
    }

    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> usize {
        self.publish(self.build(NotificationKind::Warning, title, message))
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> usize {
        self.publish(self.build(NotificationKind::Error, title, message))
    }

    /// A goal crossed a progress milestone
    pub fn goal_milestone(&self, goal: &str, percent: u8) -> usize {
        let notification = Notification::new(
            NotificationKind::Success,
            "Goal milestone reached",
            format!("\"{}\" is {}% complete", goal, percent),
            Duration::from_millis(self.config.milestone_ms),
        )
        .with_priority(if percent >= 100 {
            Priority::High
        } else {
            Priority::Normal
        })
        .with_metadata(serde_json::json!({ "goal": goal, "percent": percent }));
        self.publish(notification)
    }

    /// A post went live on a platform
    pub fn content_published(&self, platform: &str, title: &str) -> usize {
        let notification = self
            .build(
                NotificationKind::Success,
                "Content published",
                format!("\"{}\" is live on {}", title, platform),
            )
            .with_metadata(serde_json::json!({ "platform": platform, "title": title }));
        self.publish(notification)
    }

    /// A background workflow finished
    pub fn workflow_completed(&self, workflow: &str, succeeded: bool) -> usize {
        let notification = if succeeded {
            self.build(
                NotificationKind::Success,
                "Workflow completed",
                format!("{} finished successfully", workflow),
            )
        } else {
            self.build(
                NotificationKind::Error,
                "Workflow failed",
                format!("{} did not complete", workflow),
            )
            .with_action(NotificationAction::new("View details", workflow))
        };
        self.publish(notification.with_metadata(
            serde_json::json!({ "workflow": workflow, "succeeded": succeeded }),
        ))
    }

    /// A system-level alert; critical alerts stay until dismissed
    pub fn system_alert(&self, message: impl Into<String>, priority: Priority) -> usize {
        let kind = if priority >= Priority::High {
            NotificationKind::Error
        } else {
            NotificationKind::Warning
        };
        let mut notification = self
            .build(kind, "System alert", message)
            .with_priority(priority);
        if priority == Priority::Critical {
            notification = notification.persistent();
        }
        self.publish(notification)
    }

    /// A request failed; rate limiting is never reported
    ///
    /// Returns `None` when the error is not reportable.
    pub fn api_error(&self, error: &ClientError, retry_action: Option<&str>) -> Option<usize> {
        if error.api_error().is_some_and(|e| e.is_rate_limited()) {
            return None;
        }

        let mut notification = self
            .build(NotificationKind::Error, "Request failed", error.to_string())
            .with_metadata(serde_json::json!({
                "code": error.error_code(),
                "status": error.status(),
            }));
        if let Some(action_id) = retry_action {
            notification = notification.with_action(NotificationAction::retry(action_id));
        }
        Some(self.publish(notification))
    }

    /// The session could not be refreshed and the user was logged out
    pub fn session_expired(&self) -> usize {
        let notification = self
            .build(
                NotificationKind::Warning,
                "Session expired",
                "Your session has expired. Please log in again.",
            )
            .with_priority(Priority::High);
        self.publish(notification)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::with_config(NotificationConfig::default())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ApiError;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();

        assert_eq!(bus.info("Hello", "world"), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::Info);
        assert_eq!(received.title, "Hello");
        assert_eq!(
            received.duration,
            Duration::from_millis(NotificationConfig::default().info_ms)
        );
        assert!(!received.is_read);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::new(16);
        assert_eq!(bus.success("Saved", "ok"), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_get_same_notification() {
        let bus = NotificationBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.warning("Careful", "disk almost full"), 2);

        let n1 = rx1.recv().await.unwrap();
        let n2 = rx2.recv().await.unwrap();
        assert_eq!(n1.id, n2.id);
    }

    #[test]
    fn test_default_durations_differ_by_kind() {
        let bus = NotificationBus::default();
        assert!(
            bus.default_duration(NotificationKind::Error)
                > bus.default_duration(NotificationKind::Success)
        );
    }

    #[tokio::test]
    async fn test_with_config_uses_configured_capacity_and_durations() {
        let bus = NotificationBus::with_config(NotificationConfig {
            capacity: 2,
            error_ms: 12_000,
            ..NotificationConfig::default()
        });
        assert_eq!(bus.config().capacity, 2);
        assert_eq!(
            bus.default_duration(NotificationKind::Error),
            Duration::from_secs(12)
        );

        let mut rx = bus.subscribe();
        bus.info("one", "");
        bus.info("two", "");
        bus.info("three", "");

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[tokio::test]
    async fn test_goal_milestone() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();

        bus.goal_milestone("Grow followers", 100);

        let n = rx.recv().await.unwrap();
        assert_eq!(n.priority, Some(Priority::High));
        assert!(n.message.contains("100%"));
        assert_eq!(n.metadata.unwrap()["goal"], "Grow followers");
    }

    #[tokio::test]
    async fn test_failed_workflow_has_action() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();

        bus.workflow_completed("weekly-report", false);

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NotificationKind::Error);
        assert_eq!(n.action.unwrap().action_id, "weekly-report");
    }

    #[tokio::test]
    async fn test_critical_system_alert_is_persistent() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();

        bus.system_alert("Database failover", Priority::Critical);
        bus.system_alert("Slow responses", Priority::Low);

        let critical = rx.recv().await.unwrap();
        assert!(critical.persistent);
        assert_eq!(critical.kind, NotificationKind::Error);

        let low = rx.recv().await.unwrap();
        assert!(!low.persistent);
        assert_eq!(low.kind, NotificationKind::Warning);
    }

    #[tokio::test]
    async fn test_api_error_with_retry_action() {
        let bus = NotificationBus::new(16);
        let mut rx = bus.subscribe();

        let error = ClientError::PermanentRequest(ApiError::with_status(400, "bad input"));
        assert_eq!(bus.api_error(&error, Some("reload-goals")), Some(1));

        let n = rx.recv().await.unwrap();
        assert_eq!(n.action, Some(NotificationAction::retry("reload-goals")));
        assert_eq!(n.metadata.unwrap()["status"], 400);
    }

    #[test]
    fn test_rate_limited_api_error_is_not_reported() {
        let bus = NotificationBus::new(16);
        let _rx = bus.subscribe();

        let error = ClientError::PermanentRequest(ApiError::with_status(429, "slow down"));
        assert_eq!(bus.api_error(&error, None), None);
    }

    #[test]
    fn test_mark_read_and_serialization() {
        let mut n = Notification::new(
            NotificationKind::Info,
            "t",
            "m",
            Duration::from_millis(1500),
        );
        n.mark_read();

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "info");
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["is_read"], true);
        assert!(json.get("priority").is_none());
    }
}
