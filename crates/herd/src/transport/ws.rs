// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handler for the streaming surface.
//!
//! Each connection registers a ConnectedClient with the subscription
//! manager and then runs a select loop: broadcast frames drain from the
//! client's queue, incoming frames are validated and dispatched, and the
//! client's close token (heartbeat staleness or shutdown) ends the
//! connection with the appropriate close code.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::clients::{CloseCause, ConnectedClient};
use crate::id::{self, IdPrefix};
use crate::transport::state::AppState;
use crate::transport::ws_msg::{ClientMessage, ServerMessage, CLIENT_MESSAGE_TYPES};

/// Maximum accepted frame size: 1 MiB.
const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// `GET /ws` — WebSocket upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let (client, mut frame_rx) = state.clients.add_client().await;
    let closed = client.closed();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                let reason = match client.close_cause().await {
                    Some(CloseCause::Shutdown) => "server shutting down",
                    _ => "going away",
                };
                let frame = CloseFrame { code: close_code::AWAY, reason: reason.into() };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }

            // Broadcast queue -> client
            frame = frame_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Client -> server
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };
                match msg {
                    Message::Text(text) => {
                        let reply = handle_frame(&state, &client, &text).await;
                        if let Some(reply) = reply {
                            // Through the queue so ordering matches broadcasts.
                            client.send(&reply);
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.clients.remove_client(&client.id).await;
}

/// Validate and dispatch one client frame, returning the reply.
async fn handle_frame(
    state: &AppState,
    client: &ConnectedClient,
    raw: &str,
) -> Option<ServerMessage> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Some(ws_error("INVALID_JSON", "frame is not valid JSON")),
    };

    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        return Some(ws_error("INVALID_MESSAGE", "missing string field: type"));
    };
    if !CLIENT_MESSAGE_TYPES.contains(&kind) {
        return Some(ws_error("UNKNOWN_MESSAGE_TYPE", &format!("unknown message type: {kind}")));
    }

    let message: ClientMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(e) => return Some(ws_error("INVALID_MESSAGE", &format!("invalid payload: {e}"))),
    };

    match message {
        ClientMessage::SubscribeAgent { agent_id } => {
            if !id::is_valid(&agent_id, IdPrefix::Agent) {
                return Some(ws_error("INVALID_MESSAGE", "malformed agent id"));
            }
            state.clients.subscribe_to_agent(&client.id, &agent_id).await;
            Some(ServerMessage::Subscribed { kind: "agent".to_owned(), id: agent_id })
        }
        ClientMessage::UnsubscribeAgent { agent_id } => {
            if !id::is_valid(&agent_id, IdPrefix::Agent) {
                return Some(ws_error("INVALID_MESSAGE", "malformed agent id"));
            }
            state.clients.unsubscribe_from_agent(&client.id, &agent_id).await;
            Some(ServerMessage::Unsubscribed { kind: "agent".to_owned(), id: agent_id })
        }
        ClientMessage::SubscribeWorkspace { workspace_id } => {
            if !id::is_valid(&workspace_id, IdPrefix::Workspace) {
                return Some(ws_error("INVALID_MESSAGE", "malformed workspace id"));
            }
            state.clients.subscribe_to_workspace(&client.id, &workspace_id).await;
            Some(ServerMessage::Subscribed { kind: "workspace".to_owned(), id: workspace_id })
        }
        ClientMessage::UnsubscribeWorkspace { workspace_id } => {
            if !id::is_valid(&workspace_id, IdPrefix::Workspace) {
                return Some(ws_error("INVALID_MESSAGE", "malformed workspace id"));
            }
            state.clients.unsubscribe_from_workspace(&client.id, &workspace_id).await;
            Some(ServerMessage::Unsubscribed { kind: "workspace".to_owned(), id: workspace_id })
        }
        ClientMessage::Ping => {
            state.clients.update_ping(&client.id).await;
            Some(ServerMessage::Pong { timestamp: id::now_iso() })
        }
    }
}

fn ws_error(code: &str, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.to_owned(), message: message.to_owned() }
}
