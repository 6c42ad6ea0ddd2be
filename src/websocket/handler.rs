use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    sink::{Sink, SinkExt},
    stream::StreamExt,
};
use std::time::Duration;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    message::message_dto::SendMessage,
    middleware::AuthUser,
    state::AppState,
    websocket::types::{ClientMessage, WsMessage},
};

use super::connection::{ConnectionId, WsSender};

/// Live event channel for an authenticated user.
///
/// Authentication happens in the middleware before the upgrade, so a rejected
/// credential never reaches a room. Each accepted connection joins the room keyed
/// by the user's id and receives a `connected` acknowledgment.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let (connection_id, tx, rx) = open_connection(&state, user_id);
    tracing::info!("User connected: user={}, connection={}", user_id, connection_id);

    let heartbeat = Duration::from_secs(state.config.ws_heartbeat_secs.max(1));
    let ping_timeout = Duration::from_secs(state.config.ws_ping_timeout_secs);
    let closing = state.ws_connections.closing();

    let mut send_task = tokio::spawn(forward_events(sender, rx, heartbeat, closing));

    // Task: receive messages from WebSocket, in arrival order
    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = match tokio::time::timeout(ping_timeout, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::debug!("WebSocket read error for user {}: {}", user_id, e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Ping timeout for user {}, closing connection", user_id);
                    break;
                }
            };

            match msg {
                Message::Text(text) => handle_client_text(&text, user_id, &state_clone, &tx).await,
                Message::Close(_) => break,
                // Pong and ping frames only count as liveness.
                _ => {}
            }
        }
    });

    // Stop both tasks when either one finishes
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let room_closed = state.ws_connections.remove_connection(user_id, connection_id);
    tracing::info!(
        "User disconnected: user={}, connection={}, last_connection={}",
        user_id,
        connection_id,
        room_closed
    );
}

/// Joins the user's room and queues the `connected` acknowledgment.
fn open_connection(
    state: &AppState,
    user_id: Uuid,
) -> (ConnectionId, WsSender, mpsc::UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection_id = state.ws_connections.add_connection(user_id, tx.clone());
    let _ = tx.send(WsMessage::Connected);
    (connection_id, tx, rx)
}

/// Writes queued events to the socket and pings on every heartbeat.
/// Ends when the queue closes, the peer goes away, or the server starts shutting down.
async fn forward_events<S>(
    mut sender: S,
    mut rx: mpsc::UnboundedReceiver<WsMessage>,
    heartbeat: Duration,
    mut closing: watch::Receiver<bool>,
) where
    S: Sink<Message> + Unpin,
{
    let mut interval = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    let mut watching = true;
    loop {
        let shutting_down = *closing.borrow();
        if shutting_down {
            let _ = sender.send(Message::Close(None)).await;
            break;
        }

        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize {} event: {}", msg.name(), e),
                }
            }
            _ = interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            changed = closing.changed(), if watching => {
                // Registry dropped without a shutdown call: keep serving.
                watching = changed.is_ok();
            }
        }
    }
}

/// Runs one inbound frame. Failures go back as `socketError` on this connection only.
async fn handle_client_text(text: &str, user_id: Uuid, state: &AppState, tx: &WsSender) {
    if let Err(e) = process_client_message(text, user_id, state, tx).await {
        tracing::warn!("Error processing socket message from {}: {}", user_id, e);
        let _ = tx.send(WsMessage::SocketError(e.public_message()));
    }
}

/// Process an inbound event. Errors are reported to the originating connection only.
async fn process_client_message(
    text: &str,
    user_id: Uuid,
    state: &AppState,
    tx: &WsSender,
) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::SendMessage {
            chat_id,
            message_type,
            content,
            recipient,
        } => {
            state
                .message_service
                .send_message(
                    user_id,
                    chat_id,
                    SendMessage {
                        recipient,
                        message_type,
                        content,
                        attachments: Vec::new(),
                    },
                )
                .await?;
        }

        ClientMessage::Ping => {
            let _ = tx.send(WsMessage::Pong);
        }
    }

    Ok(())
}
