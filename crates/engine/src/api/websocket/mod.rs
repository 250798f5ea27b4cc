//! WebSocket handling for session participants.
//!
//! One socket per participant connection. Inbound `ClientMessage`s are
//! dispatched to the session, action and approval handlers; outbound
//! messages flow through a bounded per-connection channel that the
//! `ConnectionManager` also feeds with session broadcasts.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

mod ws_action;
mod ws_approval;
mod ws_session;

pub mod error_sanitizer;

use tablekeep_domain::{ConnectionId, SessionId};
use tablekeep_shared::{ClientMessage, ErrorCode, ServerMessage};

use super::connections::{ConnectionInfo, ConnectionManager};
use crate::app::App;

/// Combined state for WebSocket handlers.
pub struct WsState {
    pub app: Arc<App>,
    pub connections: Arc<ConnectionManager>,
}

impl WsState {
    pub fn new(app: Arc<App>) -> Self {
        let connections = app.connections.clone();
        Self { app, connections }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = ConnectionId::new();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.app.config.connection_buffer.max(1));
    state.connections.register(connection_id, tx.clone()).await;

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize server message"),
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(msg) => handle_message(msg, &state, connection_id).await,
                    Err(e) => {
                        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                        Some(error_response(
                            ErrorCode::BadRequest,
                            &format!("Invalid message format: {e}"),
                        ))
                    }
                };
                if let Some(response) = response {
                    if tx.try_send(response).is_err() {
                        tracing::warn!(
                            connection_id = %connection_id,
                            "Failed to send response, channel full or closed"
                        );
                    }
                }
            }
            Ok(Message::Ping(_)) => {
                let _ = tx.try_send(ServerMessage::Pong);
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    ws_session::leave(&state, connection_id).await;
    state.connections.unregister(connection_id).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed client message to the appropriate handler.
async fn handle_message(
    msg: ClientMessage,
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Heartbeat => Some(ServerMessage::Pong),

        ClientMessage::JoinSession {
            session_id,
            user_id,
            role,
        } => {
            tracing::info!(
                connection_id = %connection_id,
                session_id = %session_id,
                ?role,
                %user_id,
                "JoinSession message received"
            );
            ws_session::handle_join_session(state, connection_id, session_id, user_id, role).await
        }

        ClientMessage::LeaveSession => ws_session::handle_leave_session(state, connection_id).await,

        ClientMessage::RequestSnapshot { session_id } => {
            ws_session::handle_request_snapshot(state, connection_id, session_id).await
        }

        ClientMessage::ActionRequest {
            request_id,
            session_id,
            action,
            parameters,
        } => {
            ws_action::handle_action_request(
                state,
                connection_id,
                request_id,
                session_id,
                action,
                parameters,
            )
            .await
        }

        ClientMessage::ApprovalDecision {
            request_id,
            approved,
            reason,
        } => {
            ws_approval::handle_approval_decision(state, connection_id, request_id, approved, reason)
                .await
        }

        ClientMessage::Unknown => {
            tracing::warn!(connection_id = %connection_id, "Unknown message type received");
            Some(error_response(ErrorCode::BadRequest, "Unknown message type"))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn error_response(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::error(code, message)
}

/// Connection info for a connection that joined `session_id`.
async fn require_member(
    state: &WsState,
    connection_id: ConnectionId,
    session_id: SessionId,
) -> Result<ConnectionInfo, ServerMessage> {
    let info = state
        .connections
        .get(connection_id)
        .await
        .ok_or_else(|| error_response(ErrorCode::BadRequest, "Connection not found"))?;

    match info.session_id {
        Some(joined) if joined == session_id => Ok(info),
        Some(_) => Err(error_response(
            ErrorCode::Forbidden,
            "Connection belongs to a different session",
        )),
        None => Err(error_response(
            ErrorCode::NotInSession,
            "Join a session first",
        )),
    }
}

fn require_leader(info: &ConnectionInfo) -> Result<(), ServerMessage> {
    if info.is_leader() {
        Ok(())
    } else {
        tracing::warn!(
            connection_id = %info.connection_id,
            role = ?info.role,
            "Leader authorization failed"
        );
        Err(error_response(
            ErrorCode::Forbidden,
            "Only the session leader can perform this action",
        ))
    }
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod ws_integration_tests;
