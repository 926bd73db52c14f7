use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path,
    },
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::DisplayMessage;
use crate::pubsub::{SessionEvent, TokenBus};
use crate::store::SessionStore;

/// One classroom display connecting for one session's token stream.
pub async fn display_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Extension(store): Extension<Arc<SessionStore>>,
    Extension(bus): Extension<Arc<TokenBus>>,
    Extension(settings): Extension<Arc<Settings>>,
) -> Response {
    let poll = settings.attendance.liveness_poll();
    ws.on_upgrade(move |socket| stream_session(socket, session_id, store, bus, poll))
}

/// Streaming loop for a single connection. Every connection runs one of
/// these independently; they share nothing but the store and the
/// broadcast channel.
async fn stream_session(
    mut socket: WebSocket,
    session_id: String,
    store: Arc<SessionStore>,
    bus: Arc<TokenBus>,
    poll: Duration,
) {
    // Reject before subscribing: unknown or already-closed sessions get
    // one error frame and the connection ends.
    let mut last_token = match store.snapshot(&session_id) {
        Some(session) if session.active => session.current_token,
        Some(_) => {
            let _ = send_frame(
                &mut socket,
                &DisplayMessage::Error {
                    message: "Attendance session is closed".to_string(),
                },
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        None => {
            let _ = send_frame(
                &mut socket,
                &DisplayMessage::Error {
                    message: "Attendance session not found".to_string(),
                },
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    // Subscribe before the first send so a rotation landing in between
    // is not lost.
    let mut rx = bus.subscribe(&session_id);

    if send_frame(
        &mut socket,
        &DisplayMessage::Token {
            token: last_token.clone(),
        },
    )
    .await
    .is_err()
    {
        return;
    }

    let mut liveness = tokio::time::interval(poll);
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick completes immediately; burn it.
    liveness.tick().await;

    debug!("Display streaming session {}", session_id);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(SessionEvent::TokenRotated { token }) => {
                    last_token = token.clone();
                    if send_frame(&mut socket, &DisplayMessage::Token { token }).await.is_err() {
                        break;
                    }
                }
                Ok(SessionEvent::Closed) => {
                    let _ = send_frame(&mut socket, &DisplayMessage::Closed).await;
                    break;
                }
                // Channel torn down at close; the liveness arm would
                // catch it too, this is just sooner.
                Err(RecvError::Closed) => {
                    let _ = send_frame(&mut socket, &DisplayMessage::Closed).await;
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed publishes are fine: the next liveness pass
                    // re-reads the current token from the store.
                    warn!("Display for session {} lagged, skipped {} event(s)", session_id, skipped);
                }
            },

            _ = liveness.tick() => {
                match store.snapshot(&session_id) {
                    Some(session) if session.active => {
                        if session.current_token != last_token {
                            last_token = session.current_token.clone();
                            if send_frame(&mut socket, &DisplayMessage::Token {
                                token: session.current_token,
                            }).await.is_err() {
                                break;
                            }
                        }
                    }
                    // Closed by the teacher, or gone entirely.
                    _ => {
                        let _ = send_frame(&mut socket, &DisplayMessage::Closed).await;
                        break;
                    }
                }
            }

            frame = socket.recv() => match frame {
                // Displays only listen; anything but a close is ignored.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    debug!("Display stream for session {} ended", session_id);
    // Dropping `rx` releases the channel subscription.
}

async fn send_frame(socket: &mut WebSocket, message: &DisplayMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message)
        .map_err(|e| axum::Error::new(e))?;
    socket.send(Message::Text(text.into())).await
}
