//! Background health monitoring
//!
//! The monitor is what seeds the client's fast-fail path: a failed probe
//! marks the backend `Disconnected` so requests stop hitting it, and the next
//! successful probe reopens the gate.

use super::{ConnectionStatus, RequestClient};
use crate::core::error::ApiError;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodically probes the backend and updates the client status
pub struct HealthMonitor {
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor; the first probe runs immediately
    pub fn spawn<F, Fut>(client: Arc<RequestClient>, probe: F, interval: Duration) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_ms = interval.as_millis() as u64, "Health monitor started");

            let mut last = None;
            loop {
                ticker.tick().await;
                let status = client.check_health(&probe).await;
                if last != Some(status) {
                    tracing::debug!(status = ?status, "Health probe result changed");
                    last = Some(status);
                }
            }
        });

        Self { handle }
    }

    /// Probe once immediately, outside the schedule
    pub async fn probe_now<F, Fut>(client: &RequestClient, probe: F) -> ConnectionStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        client.check_health(probe).await
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop probing
    pub fn stop(self) {
        self.handle.abort();
        tracing::info!("Health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use crate::core::auth::NoAuthProvider;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_monitor_flips_status_with_probe_results() {
        let client = Arc::new(RequestClient::new(
            RequestConfig::default(),
            Arc::new(NoAuthProvider),
        ));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let monitor = HealthMonitor::spawn(
            client.clone(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ApiError::network("down"))
                    } else {
                        Ok(json!({"status": "healthy"}))
                    }
                }
            },
            Duration::from_secs(30),
        );

        let mut status = client.subscribe_status();
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);

        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), ConnectionStatus::Connected);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(monitor.is_running());

        monitor.stop();
    }

    #[tokio::test]
    async fn test_probe_now() {
        let client = RequestClient::new(RequestConfig::default(), Arc::new(NoAuthProvider));
        let status = HealthMonitor::probe_now(&client, || async {
            Ok::<_, ApiError>(json!({"status": "ok"}))
        })
        .await;
        assert_eq!(status, ConnectionStatus::Connected);
    }
}
