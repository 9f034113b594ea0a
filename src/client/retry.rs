//! Tracked retry timers
//!
//! Each scheduled retry is a spawned sleep registered under
//! `(operation, attempt)`. Scheduling a timer for a key that already has one
//! aborts the stale timer first, so a key never has two live timers.
//! Clearing the registry aborts every pending timer; the callers waiting on
//! them observe [`ClientError::Cancelled`].

use crate::core::error::ClientError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Backoff before retry `attempt` (1-indexed): `base * 2^(attempt-1)`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(30);
    base.saturating_mul(1u32 << exp)
}

#[derive(Debug, Default)]
pub(crate) struct RetryTimers {
    pending: Mutex<HashMap<String, (u64, AbortHandle)>>,
    generation: AtomicU64,
}

impl RetryTimers {
    pub(crate) fn key(operation: &str, attempt: u32) -> String {
        format!("{}_{}", operation, attempt)
    }

    /// Sleep for `delay` under `key`
    pub(crate) async fn wait(&self, key: String, delay: Duration) -> Result<(), ClientError> {
        let timer = tokio::spawn(tokio::time::sleep(delay));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let stale = self
            .lock()
            .insert(key.clone(), (generation, timer.abort_handle()));
        if let Some((_, stale)) = stale {
            tracing::debug!(retry_key = %key, "Replacing stale retry timer");
            stale.abort();
        }

        let outcome = timer.await;

        {
            let mut pending = self.lock();
            if pending.get(&key).is_some_and(|(g, _)| *g == generation) {
                pending.remove(&key);
            }
        }

        outcome.map_err(|_| ClientError::Cancelled)
    }

    /// Abort every pending timer, returning how many were live
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, (_, handle)) in &drained {
            handle.abort();
        }
        drained.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (u64, AbortHandle)>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_backoff_doubles_from_base() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_elapses_and_unregisters() {
        let timers = RetryTimers::default();
        let start = tokio::time::Instant::now();

        timers
            .wait(RetryTimers::key("op", 1), Duration::from_millis(250))
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_replaces_stale_timer() {
        let timers = Arc::new(RetryTimers::default());

        let first = {
            let timers = timers.clone();
            tokio::spawn(async move {
                timers
                    .wait(RetryTimers::key("op", 1), Duration::from_secs(10))
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(timers.pending(), 1);

        let second = timers
            .wait(RetryTimers::key("op", 1), Duration::from_millis(10))
            .await;

        assert!(second.is_ok());
        assert!(matches!(first.await.unwrap(), Err(ClientError::Cancelled)));
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_waiters() {
        let timers = Arc::new(RetryTimers::default());

        let waiter = {
            let timers = timers.clone();
            tokio::spawn(async move {
                timers
                    .wait(RetryTimers::key("op", 1), Duration::from_secs(60))
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert_eq!(timers.clear(), 1);
        assert!(matches!(waiter.await.unwrap(), Err(ClientError::Cancelled)));
    }
}
