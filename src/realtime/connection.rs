//! Connection supervisor and per-session message loop
//!
//! One supervisor task runs per `connect()`. It dials the endpoint, runs the
//! session loop until the socket closes, and then either stops (deliberate
//! close, local shutdown, attempts exhausted) or sleeps `base * 2^attempt`
//! and dials again.

use super::protocol::{ClientMessage, NORMAL_CLOSURE};
use super::{ChannelEvent, ChannelState, ConnectionError, Shared};
use futures::SinkExt;
use futures::stream::StreamExt;
use std::sync::atomic::Ordering;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a session ended
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect()` was called locally
    Shutdown,
    /// The server closed with the normal-closure code
    Deliberate,
    /// Anything else: dial failure, error, abnormal close, stream end
    Abnormal { code: Option<u16>, reason: String },
}

pub(super) async fn supervise(
    shared: std::sync::Arc<Shared>,
    endpoint: String,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let attempt = shared.attempts.load(Ordering::SeqCst);
        shared.set_state(ChannelState::Connecting);
        shared.emit(ChannelEvent::Connecting { attempt });
        tracing::debug!(endpoint = %endpoint, attempt, "Dialing realtime endpoint");

        let dialed = tokio::select! {
            result = tokio_tungstenite::connect_async(endpoint.as_str()) => result,
            _ = shutdown.changed() => break,
        };

        let end = match dialed {
            Ok((socket, _response)) => {
                shared.on_open();
                tracing::info!(endpoint = %endpoint, "Realtime channel open");
                run_session(&shared, socket, &mut shutdown).await
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Realtime dial failed");
                shared.record_error(ConnectionError::transient(e.to_string(), attempt));
                SessionEnd::Abnormal {
                    code: None,
                    reason: e.to_string(),
                }
            }
        };

        shared.set_outbound(None);
        shared.set_state(ChannelState::Closed);

        let (code, reason) = match end {
            SessionEnd::Shutdown => {
                shared.emit(ChannelEvent::Closed {
                    code: Some(NORMAL_CLOSURE),
                    deliberate: true,
                });
                break;
            }
            SessionEnd::Deliberate => {
                tracing::info!("Realtime channel closed by server");
                shared.emit(ChannelEvent::Closed {
                    code: Some(NORMAL_CLOSURE),
                    deliberate: true,
                });
                break;
            }
            SessionEnd::Abnormal { code, reason } => (code, reason),
        };

        shared.emit(ChannelEvent::Closed {
            code,
            deliberate: false,
        });

        let max = shared.config.max_reconnect_attempts;
        let attempt = shared.attempts.load(Ordering::SeqCst);
        if attempt >= max {
            tracing::error!(attempts = attempt, reason = %reason, "Realtime reconnect attempts exhausted");
            shared.record_error(ConnectionError::exhausted(attempt));
            shared.emit(ChannelEvent::ReconnectFailed { attempts: attempt });
            break;
        }

        let delay = shared.config.reconnect_delay(attempt);
        shared.attempts.store(attempt + 1, Ordering::SeqCst);
        shared.emit(ChannelEvent::ReconnectScheduled {
            attempt: attempt + 1,
            delay,
        });
        tracing::info!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            code = ?code,
            "Realtime reconnect scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    shared.set_state(ChannelState::Closed);
}

async fn run_session(
    shared: &Shared,
    socket: Socket,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut ws_write, mut ws_read) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    shared.set_outbound(Some(out_tx));

    let period = shared.config.heartbeat_interval();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut visibility = shared.visible.subscribe();
    let mut visible = *visibility.borrow_and_update();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                return SessionEnd::Shutdown;
            }

            Ok(()) = visibility.changed() => {
                visible = *visibility.borrow_and_update();
                if visible {
                    heartbeat.reset();
                    tracing::debug!("Page visible, heartbeat resumed");
                } else {
                    tracing::debug!("Page hidden, heartbeat paused");
                }
            }

            _ = heartbeat.tick(), if visible => {
                let json = match serde_json::to_string(&ClientMessage::heartbeat()) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize heartbeat");
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                    return write_failed(shared, e);
                }
                shared.emit(ChannelEvent::HeartbeatSent);
            }

            Some(message) = out_rx.recv() => {
                if let Err(e) = ws_write.send(message).await {
                    return write_failed(shared, e);
                }
            }

            frame = ws_read.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => shared.dispatch(text),
                    Err(e) => tracing::warn!(error = %e, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                    tracing::debug!(code = ?code, reason = %reason, "Server sent close frame");
                    return if code == Some(NORMAL_CLOSURE) {
                        SessionEnd::Deliberate
                    } else {
                        SessionEnd::Abnormal { code, reason }
                    };
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Realtime read error");
                    let attempt = shared.attempts.load(Ordering::SeqCst);
                    shared.record_error(ConnectionError::transient(e.to_string(), attempt));
                    return SessionEnd::Abnormal {
                        code: None,
                        reason: e.to_string(),
                    };
                }
                None => {
                    return SessionEnd::Abnormal {
                        code: None,
                        reason: "stream ended".to_string(),
                    };
                }
            },
        }
    }
}

fn write_failed(shared: &Shared, e: tokio_tungstenite::tungstenite::Error) -> SessionEnd {
    tracing::warn!(error = %e, "Realtime write failed");
    let attempt = shared.attempts.load(Ordering::SeqCst);
    shared.record_error(ConnectionError::transient(e.to_string(), attempt));
    SessionEnd::Abnormal {
        code: None,
        reason: e.to_string(),
    }
}
