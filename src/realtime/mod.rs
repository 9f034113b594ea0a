//! Realtime push channel
//!
//! [`RealtimeChannel`] keeps one WebSocket open to `{ws_url}/{user_id}` for
//! the current identity, routes server pushes to registered handlers, sends a
//! heartbeat while the page is visible, and reconnects with exponential
//! backoff after abnormal closes.
//!
//! ```no_run
//! use pulse::config::RealtimeConfig;
//! use pulse::realtime::RealtimeChannel;
//!
//! # async fn demo() {
//! let channel = RealtimeChannel::new(RealtimeConfig::default());
//! let _registration = channel.add_message_handler("new_interaction", |msg| {
//!     println!("{:?}", msg.payload());
//! });
//! channel.set_identity(Some("user-1".to_string())).await;
//! # }
//! ```

mod connection;
pub mod inbox;
pub mod protocol;
pub mod registry;

pub use inbox::{InboxEvent, InboxFeed, InboxUpdate};
pub use protocol::{ClientMessage, RealtimeMessage};
pub use registry::{HandlerRegistry, MessageHandler};

use crate::config::RealtimeConfig;
use crate::core::error::ClientError;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// How long `disconnect()` waits for the close handshake before aborting
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

/// Socket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Lifecycle notifications for observers and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A dial started; `attempt` is the reconnect counter at that moment
    Connecting { attempt: u32 },
    Opened,
    Closed { code: Option<u16>, deliberate: bool },
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Attempts exhausted; the channel stays closed until `reconnect()`
    ReconnectFailed { attempts: u32 },
    HeartbeatSent,
}

/// Last connection failure surfaced by the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub message: String,
    pub attempts: u32,
    /// No further reconnects will be made
    pub terminal: bool,
}

impl ConnectionError {
    pub(crate) fn transient(message: impl Into<String>, attempts: u32) -> Self {
        Self {
            message: message.into(),
            attempts,
            terminal: false,
        }
    }

    pub(crate) fn exhausted(attempts: u32) -> Self {
        Self {
            message: format!("Failed to reconnect after {} attempts", attempts),
            attempts,
            terminal: true,
        }
    }
}

impl From<ConnectionError> for ClientError {
    fn from(e: ConnectionError) -> Self {
        ClientError::RealtimeConnection {
            message: e.message,
            attempts: e.attempts,
        }
    }
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub(crate) struct Shared {
    config: RealtimeConfig,
    registry: HandlerRegistry,
    state: watch::Sender<ChannelState>,
    visible: watch::Sender<bool>,
    events: broadcast::Sender<ChannelEvent>,
    identity: Mutex<Option<String>>,
    error: Mutex<Option<ConnectionError>>,
    attempts: AtomicU32,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    worker: Mutex<Option<Worker>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn emit(&self, event: ChannelEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<Message>>) {
        *lock(&self.outbound) = sender;
    }

    fn record_error(&self, error: ConnectionError) {
        *lock(&self.error) = Some(error);
    }

    fn on_open(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        *lock(&self.error) = None;
        self.set_state(ChannelState::Open);
        self.emit(ChannelEvent::Opened);
    }

    fn dispatch(&self, text: &str) {
        match RealtimeMessage::parse(text) {
            Ok(message) => {
                let handled = self.registry.dispatch(&message);
                tracing::trace!(message_type = %message.kind, handled, "Realtime message dispatched");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping realtime message");
            }
        }
    }
}

/// Handle returned by [`RealtimeChannel::add_message_handler`]
///
/// Dropping it keeps the handler registered.
pub struct HandlerRegistration {
    kind: String,
    handler: MessageHandler,
    shared: Arc<Shared>,
}

impl HandlerRegistration {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Unregister the handler unless it has since been replaced
    pub fn remove(self) -> bool {
        self.shared
            .registry
            .remove_if_current(&self.kind, &self.handler)
    }
}

/// Identity-scoped WebSocket channel with reconnect and heartbeat
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
}

impl RealtimeChannel {
    pub fn new(config: RealtimeConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        let (visible, _) = watch::channel(true);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                config,
                registry: HandlerRegistry::new(),
                state,
                visible,
                events,
                identity: Mutex::new(None),
                error: Mutex::new(None),
                attempts: AtomicU32::new(0),
                outbound: Mutex::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.shared.config
    }

    /// Open the socket for the current identity
    ///
    /// Returns `false` without doing anything when there is no identity or a
    /// connection (open, dialing, or waiting to reconnect) already exists.
    pub fn connect(&self) -> bool {
        let Some(user_id) = self.identity() else {
            tracing::debug!("No identity, realtime connect skipped");
            return false;
        };

        let mut worker = lock(&self.shared.worker);
        if let Some(existing) = worker.as_ref()
            && !existing.handle.is_finished()
        {
            return false;
        }

        let endpoint = self.shared.config.endpoint_for(&user_id);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(connection::supervise(
            self.shared.clone(),
            endpoint,
            shutdown_rx,
        ));
        *worker = Some(Worker { shutdown, handle });
        true
    }

    /// Close the socket with the normal-closure code and cancel any pending
    /// reconnect. No reconnect follows.
    pub async fn disconnect(&self) {
        let worker = lock(&self.shared.worker).take();
        if let Some(Worker {
            shutdown,
            mut handle,
        }) = worker
        {
            let _ = shutdown.send(true);
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                tracing::debug!("Close handshake timed out, aborting realtime task");
                handle.abort();
            }
            tracing::info!("Realtime channel disconnected");
        }

        self.shared.set_outbound(None);
        self.shared.attempts.store(0, Ordering::SeqCst);
        *lock(&self.shared.error) = None;
        self.shared.set_state(ChannelState::Closed);
    }

    /// Reset the attempt counter and dial again, e.g. after attempts ran out
    pub async fn reconnect(&self) -> bool {
        self.disconnect().await;
        self.connect()
    }

    /// Serialize and send a message; `false` when the socket is not open
    pub fn send<M: Serialize + ?Sized>(&self, message: &M) -> bool {
        if self.state() != ChannelState::Open {
            return false;
        }

        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        match lock(&self.shared.outbound).as_ref() {
            Some(sender) => sender.send(Message::Text(json.into())).is_ok(),
            None => false,
        }
    }

    /// Register `handler` for messages of type `kind` (`"*"` for all)
    ///
    /// Replaces any handler already registered for `kind`.
    pub fn add_message_handler<F>(&self, kind: impl Into<String>, handler: F) -> HandlerRegistration
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let handler: MessageHandler = Arc::new(handler);
        self.shared.registry.insert(kind.clone(), handler.clone());
        HandlerRegistration {
            kind,
            handler,
            shared: self.shared.clone(),
        }
    }

    pub fn remove_message_handler(&self, kind: &str) -> bool {
        self.shared.registry.remove(kind)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn identity(&self) -> Option<String> {
        lock(&self.shared.identity).clone()
    }

    /// Switch identity: tear down the old socket and, if `user_id` is set,
    /// open one for the new identity
    pub async fn set_identity(&self, user_id: Option<String>) {
        let changed = {
            let mut identity = lock(&self.shared.identity);
            if *identity == user_id {
                false
            } else {
                *identity = user_id.clone();
                true
            }
        };

        if changed {
            tracing::info!(user_id = ?user_id, "Realtime identity changed");
            self.disconnect().await;
        }
        if user_id.is_some() {
            self.connect();
        }
    }

    /// Track an identity source, reconnecting whenever it changes
    ///
    /// The task disconnects and exits when the source is dropped.
    pub fn follow_identity(&self, mut source: watch::Receiver<Option<String>>) -> JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            loop {
                let user_id = source.borrow_and_update().clone();
                channel.set_identity(user_id).await;
                if source.changed().await.is_err() {
                    channel.disconnect().await;
                    break;
                }
            }
        })
    }

    /// Pause (hidden) or resume (visible) the heartbeat
    pub fn set_page_visible(&self, visible: bool) {
        self.shared.visible.send_replace(visible);
    }

    pub fn is_page_visible(&self) -> bool {
        *self.shared.visible.borrow()
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    pub fn connection_error(&self) -> Option<ConnectionError> {
        lock(&self.shared.error).clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}
