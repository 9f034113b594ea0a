//! Message handler registry
//!
//! One handler per event type; registering again for the same type replaces
//! the previous handler. The `*` key receives every message after the
//! type-specific handler.

use super::protocol::{RealtimeMessage, WILDCARD};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Callback invoked for a server push
pub type MessageHandler = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, returning `true` if one was replaced
    pub fn insert(&self, kind: impl Into<String>, handler: MessageHandler) -> bool {
        let kind = kind.into();
        let replaced = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind.clone(), handler)
            .is_some();
        if replaced {
            tracing::debug!(message_type = %kind, "Replaced message handler");
        }
        replaced
    }

    /// Unregister the handler for `kind`; removing a missing handler is a no-op
    pub fn remove(&self, kind: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kind)
            .is_some()
    }

    /// Unregister `handler` only if it is still the one registered for `kind`
    pub fn remove_if_current(&self, kind: &str, handler: &MessageHandler) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.get(kind) {
            Some(current) if Arc::ptr_eq(current, handler) => {
                handlers.remove(kind);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the handler for the message type, then the wildcard handler
    ///
    /// Handlers run outside the registry lock, so they may (un)register
    /// handlers themselves. Returns the number of handlers invoked.
    pub fn dispatch(&self, message: &RealtimeMessage) -> usize {
        let (specific, wildcard) = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            let specific = if message.kind == WILDCARD {
                None
            } else {
                handlers.get(&message.kind).cloned()
            };
            (specific, handlers.get(WILDCARD).cloned())
        };

        let mut invoked = 0;
        for handler in [specific, wildcard].into_iter().flatten() {
            handler(message);
            invoked += 1;
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> MessageHandler {
        let log = log.clone();
        Arc::new(move |msg: &RealtimeMessage| {
            log.lock().unwrap().push(format!("{}:{}", tag, msg.kind));
        })
    }

    #[test]
    fn test_dispatch_specific_then_wildcard() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.insert(WILDCARD, recorder(&log, "any"));
        registry.insert("foo", recorder(&log, "foo"));

        let invoked = registry.dispatch(&RealtimeMessage::new("foo", json!({})));
        assert_eq!(invoked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["foo:foo", "any:foo"]);
    }

    #[test]
    fn test_handler_isolation() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.insert("foo", recorder(&log, "foo"));

        assert_eq!(registry.dispatch(&RealtimeMessage::new("bar", json!({}))), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        assert!(!registry.insert("foo", recorder(&log, "first")));
        assert!(registry.insert("foo", recorder(&log, "second")));
        assert_eq!(registry.len(), 1);

        registry.dispatch(&RealtimeMessage::new("foo", json!(null)));
        assert_eq!(*log.lock().unwrap(), vec!["second:foo"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = HandlerRegistry::new();
        registry.insert("foo", Arc::new(|_: &RealtimeMessage| {}));

        assert!(registry.remove("foo"));
        assert!(!registry.remove("foo"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_if_current_ignores_replaced_handler() {
        let registry = HandlerRegistry::new();
        let first: MessageHandler = Arc::new(|_: &RealtimeMessage| {});
        let second: MessageHandler = Arc::new(|_: &RealtimeMessage| {});

        registry.insert("foo", first.clone());
        registry.insert("foo", second.clone());

        assert!(!registry.remove_if_current("foo", &first));
        assert!(registry.contains("foo"));
        assert!(registry.remove_if_current("foo", &second));
        assert!(!registry.contains("foo"));
    }

    #[test]
    fn test_wildcard_typed_message_invokes_wildcard_once() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.insert(WILDCARD, recorder(&log, "any"));

        assert_eq!(registry.dispatch(&RealtimeMessage::new("*", json!(1))), 1);
    }

    #[test]
    fn test_handler_may_unregister_itself() {
        let registry = Arc::new(HandlerRegistry::new());
        let inner = registry.clone();
        registry.insert(
            "once",
            Arc::new(move |_: &RealtimeMessage| {
                inner.remove("once");
            }),
        );

        assert_eq!(registry.dispatch(&RealtimeMessage::new("once", json!(1))), 1);
        assert!(!registry.contains("once"));
    }
}
