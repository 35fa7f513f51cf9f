//! WebSocket connection handling.
//!
//! Every connection may be in at most one session at a time. Broadcasts go to
//! all other connections in the same session and are never echoed back.

use crate::state::{AppState, Envelope};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tutorboard_core::sync::{ClientMessage, ServerMessage};
use uuid::Uuid;

/// Index page
pub async fn index() -> &'static str {
    "Tutorboard Relay Server - Connect via WebSocket at /ws"
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Current session of a connection.
struct Membership {
    topic: String,
    user_id: String,
    rx: broadcast::Receiver<Envelope>,
}

type Sender = SplitSink<WebSocket, Message>;

async fn send(sender: &mut Sender, msg: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            Ok(())
        }
    }
}

async fn send_error(sender: &mut Sender, message: String) -> Result<(), axum::Error> {
    send(sender, &ServerMessage::Error { message }).await
}

fn leave(state: &AppState, peer_id: &str, membership: Membership) {
    if let Some(user_id) = state.leave_room(&membership.topic, peer_id) {
        state.broadcast(&membership.topic, peer_id, ServerMessage::PeerLeft { user_id });
    }
    info!(
        "Peer {} ({}) left {}",
        peer_id, membership.user_id, membership.topic
    );
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut membership: Option<Membership> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        if send_error(&mut sender, "Binary frames are not supported".to_string()).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                };

                let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => client_msg,
                    Err(e) => {
                        warn!("Invalid message from {}: {}", peer_id, e);
                        if send_error(&mut sender, format!("Invalid message: {}", e)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                match client_msg {
                    ClientMessage::Join { session, user_id } => {
                        // Leave current session if any
                        if let Some(old) = membership.take() {
                            leave(&state, &peer_id, old);
                        }

                        let (rx, peer_count) = state.join_room(&session, &peer_id, &user_id);
                        let joined = ServerMessage::Joined {
                            session: session.clone(),
                            peer_count,
                        };
                        if send(&mut sender, &joined).await.is_err() {
                            state.leave_room(&session, &peer_id);
                            break;
                        }

                        // Notify others
                        state.broadcast(&session, &peer_id, ServerMessage::PeerJoined {
                            user_id: user_id.clone(),
                        });
                        info!("Peer {} ({}) joined {}", peer_id, user_id, session);
                        membership = Some(Membership { topic: session, user_id, rx });
                    }
                    ClientMessage::Leave => {
                        if let Some(old) = membership.take() {
                            leave(&state, &peer_id, old);
                        }
                    }
                    ClientMessage::Broadcast { event, payload } => match &membership {
                        Some(current) => {
                            debug!("{} broadcast {} to {}", current.user_id, event, current.topic);
                            state.broadcast(&current.topic, &peer_id, ServerMessage::Broadcast {
                                from: current.user_id.clone(),
                                event,
                                payload,
                            });
                        }
                        None => {
                            if send_error(&mut sender, "Join a session before broadcasting".to_string()).await.is_err() {
                                break;
                            }
                        }
                    },
                }
            }

            // Handle broadcast messages from the session
            msg = async {
                match &mut membership {
                    Some(current) => current.rx.recv().await,
                    None => std::future::pending::<Result<Envelope, RecvError>>().await,
                }
            } => {
                match msg {
                    Ok((from, server_msg)) => {
                        // Don't echo back to the publisher
                        if from != peer_id && send(&mut sender, &server_msg).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Peer {} missed {} messages", peer_id, missed);
                    }
                    Err(RecvError::Closed) => {
                        membership = None;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(current) = membership.take() {
        leave(&state, &peer_id, current);
    }
    info!("Connection closed: {}", peer_id);
}
