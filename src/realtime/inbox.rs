//! Interaction feed built on the realtime channel
//!
//! The feed registers one handler per interaction event type and keeps the
//! most recent payloads of each in its own buffer (newest first, capped).
//! Server `notification` pushes are additionally republished on the
//! [`NotificationBus`].

use super::protocol::RealtimeMessage;
use super::{HandlerRegistration, RealtimeChannel};
use crate::core::notifications::{NotificationBus, NotificationKind, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const UPDATE_CAPACITY: usize = 128;

/// Interaction event types carried by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxEvent {
    NewInteraction,
    InteractionUpdated,
    ResponseGenerated,
    ResponseSent,
    Notification,
    Error,
}

impl InboxEvent {
    pub const ALL: [InboxEvent; 6] = [
        InboxEvent::NewInteraction,
        InboxEvent::InteractionUpdated,
        InboxEvent::ResponseGenerated,
        InboxEvent::ResponseSent,
        InboxEvent::Notification,
        InboxEvent::Error,
    ];

    /// Wire name used as the message `type`
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxEvent::NewInteraction => "new_interaction",
            InboxEvent::InteractionUpdated => "interaction_updated",
            InboxEvent::ResponseGenerated => "response_generated",
            InboxEvent::ResponseSent => "response_sent",
            InboxEvent::Notification => "notification",
            InboxEvent::Error => "error",
        }
    }

    pub fn from_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == kind)
    }
}

/// A payload appended to one of the feed buffers
#[derive(Debug, Clone, PartialEq)]
pub struct InboxUpdate {
    pub event: InboxEvent,
    pub payload: Value,
}

/// Shape of a server-pushed notification payload
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerNotification {
    #[serde(rename = "type")]
    kind: Option<NotificationKind>,
    title: Option<String>,
    message: Option<String>,
    priority: Option<Priority>,
}

struct Buffers {
    capacity: usize,
    entries: HashMap<InboxEvent, VecDeque<Value>>,
}

impl Buffers {
    fn push(&mut self, event: InboxEvent, payload: Value) {
        let buffer = self.entries.entry(event).or_default();
        buffer.push_front(payload);
        buffer.truncate(self.capacity);
    }
}

struct FeedState {
    buffers: Mutex<Buffers>,
    updates: broadcast::Sender<InboxUpdate>,
    notifications: Option<NotificationBus>,
}

impl FeedState {
    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: InboxEvent, message: &RealtimeMessage) {
        let payload = message.payload().cloned().unwrap_or(Value::Null);
        self.buffers().push(event, payload.clone());

        if event == InboxEvent::Notification
            && let Some(bus) = &self.notifications
        {
            republish(bus, &payload);
        }

        let _ = self.updates.send(InboxUpdate { event, payload });
    }
}

fn republish(bus: &NotificationBus, payload: &Value) {
    let parsed = match payload {
        Value::String(text) => ServerNotification {
            message: Some(text.clone()),
            ..ServerNotification::default()
        },
        other => serde_json::from_value(other.clone()).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Unrecognized notification payload");
            ServerNotification::default()
        }),
    };

    let kind = parsed.kind.unwrap_or(NotificationKind::Info);
    let mut notification = bus
        .build(
            kind,
            parsed.title.unwrap_or_else(|| "Notification".to_string()),
            parsed.message.unwrap_or_default(),
        )
        .with_metadata(payload.clone());
    if let Some(priority) = parsed.priority {
        notification = notification.with_priority(priority);
    }
    bus.publish(notification);
}

/// Capped per-event buffers fed by a [`RealtimeChannel`]
pub struct InboxFeed {
    state: Arc<FeedState>,
    registrations: Mutex<Vec<HandlerRegistration>>,
}

impl InboxFeed {
    /// Register the feed's handlers on `channel`
    ///
    /// Buffer capacity comes from the channel's `feed_buffer_capacity`.
    pub fn attach(channel: &RealtimeChannel, notifications: Option<NotificationBus>) -> Self {
        let capacity = channel.config().feed_buffer_capacity.max(1);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let state = Arc::new(FeedState {
            buffers: Mutex::new(Buffers {
                capacity,
                entries: HashMap::new(),
            }),
            updates,
            notifications,
        });

        let registrations = InboxEvent::ALL
            .into_iter()
            .map(|event| {
                let state = state.clone();
                channel.add_message_handler(event.as_str(), move |message| {
                    state.record(event, message)
                })
            })
            .collect();

        tracing::debug!(capacity, "Inbox feed attached");
        Self {
            state,
            registrations: Mutex::new(registrations),
        }
    }

    /// Unregister the feed's handlers; buffers keep their contents
    pub fn detach(&self) {
        let registrations: Vec<_> = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for registration in registrations {
            registration.remove();
        }
        tracing::debug!("Inbox feed detached");
    }

    /// Buffered payloads for `event`, newest first
    pub fn items(&self, event: InboxEvent) -> Vec<Value> {
        self.state
            .buffers()
            .entries
            .get(&event)
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, event: InboxEvent) -> Option<Value> {
        self.state
            .buffers()
            .entries
            .get(&event)
            .and_then(|b| b.front().cloned())
    }

    pub fn len(&self, event: InboxEvent) -> usize {
        self.state
            .buffers()
            .entries
            .get(&event)
            .map_or(0, VecDeque::len)
    }

    pub fn clear(&self, event: InboxEvent) {
        self.state.buffers().entries.remove(&event);
    }

    pub fn clear_all(&self) {
        self.state.buffers().entries.clear();
    }

    pub fn new_interactions(&self) -> Vec<Value> {
        self.items(InboxEvent::NewInteraction)
    }

    pub fn errors(&self) -> Vec<Value> {
        self.items(InboxEvent::Error)
    }

    /// Stream of payloads as they are buffered
    pub fn subscribe(&self) -> broadcast::Receiver<InboxUpdate> {
        self.state.updates.subscribe()
    }
}
