//! Watch the interaction inbox of a dashboard account
//!
//! ```bash
//! PULSE_EMAIL=ada@example.com PULSE_PASSWORD=secret \
//!     RUST_LOG=pulse=debug cargo run --example inbox_watch -- config.yaml
//! ```

use pulse::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ClientConfig::from_yaml_file(&path)?,
        None => ClientConfig::default(),
    };
    let email = std::env::var("PULSE_EMAIL")?;
    let password = std::env::var("PULSE_PASSWORD")?;

    println!("📡 Pulse inbox watch ({})\n", config.request.base_url);

    let store = TokenStore::new();
    let auth = Arc::new(HttpAuthProvider::new(
        config.request.base_url.clone(),
        store.clone(),
    ));
    let notifications = NotificationBus::with_config(config.notifications.clone());
    let client = Arc::new(
        RequestClient::new(config.request.clone(), auth.clone())
            .with_notifications(notifications.clone()),
    );
    let backend = HttpBackend::from_config(&config.request, auth.clone());

    let monitor = {
        let backend = backend.clone();
        HealthMonitor::spawn(
            client.clone(),
            move || {
                let backend = backend.clone();
                async move { backend.health().await }
            },
            config.request.health_check_interval(),
        )
    };

    let session = auth.login(&email, &password).await?;
    println!("✅ Logged in as {}", session.user_id.as_deref().unwrap_or("?"));

    let channel = RealtimeChannel::new(config.realtime.clone());
    let follower = channel.follow_identity(store.subscribe_identity());
    let feed = InboxFeed::attach(&channel, Some(notifications.clone()));

    let recent = client
        .execute(
            || backend.get_json("/interactions?limit=10"),
            RequestOptions::new().cached("interactions_recent").retries(2),
        )
        .await;
    match recent {
        Ok(items) => println!("📥 Recent interactions: {}", items),
        Err(e) => println!("⚠️  Could not load recent interactions: {} ({})", e, e.error_code()),
    }

    let mut updates = feed.subscribe();
    let mut alerts = notifications.subscribe();
    let mut channel_events = channel.subscribe_events();

    println!("👀 Waiting for events (Ctrl+C to stop)\n");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(update) = updates.recv() => {
                println!("[{}] {}", update.event.as_str(), update.payload);
            }
            Ok(alert) = alerts.recv() => {
                println!("🔔 {:?}: {} - {}", alert.kind, alert.title, alert.message);
            }
            Ok(event) = channel_events.recv() => {
                if let ChannelEvent::ReconnectFailed { attempts } = event {
                    println!("❌ Realtime gave up after {} attempts", attempts);
                }
            }
        }
    }

    feed.detach();
    follower.abort();
    channel.disconnect().await;
    monitor.stop();
    client.shutdown();
    auth.logout().await;

    println!("\n👋 Bye");
    Ok(())
}
