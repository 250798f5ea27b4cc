use tablekeep_domain::{ConnectionId, SessionId};
use tablekeep_shared::{ErrorCode, JoinError, ParticipantRole, ServerMessage};

use super::*;
use crate::api::websocket::error_sanitizer::sanitize_error;

pub(super) async fn handle_join_session(
    state: &WsState,
    connection_id: ConnectionId,
    session_id: SessionId,
    user_id: String,
    role: ParticipantRole,
) -> Option<ServerMessage> {
    let join_failed = |error: JoinError| {
        Some(ServerMessage::SessionJoinFailed { session_id, error })
    };

    match state.connections.get(connection_id).await {
        Some(info) if info.session_id.is_some() => return join_failed(JoinError::AlreadyInSession),
        Some(_) => {}
        None => return Some(error_response(ErrorCode::BadRequest, "Connection not found")),
    }
    if !role.can_submit() {
        return join_failed(JoinError::InvalidRole);
    }

    let handle = match state.app.sessions.get_or_start(session_id).await {
        Ok(handle) => handle,
        Err(e) => {
            return join_failed(JoinError::SessionUnavailable {
                message: sanitize_error(&e, "starting the session"),
            });
        }
    };

    let joined = state
        .connections
        .join_session(connection_id, session_id, user_id, role, |participant_id| {
            Some(ServerMessage::SessionJoined {
                session_id,
                participant_id,
                role,
                snapshot: (*handle.snapshot()).clone(),
            })
        })
        .await;

    match joined {
        // The reply was queued by the join itself.
        Ok(_) => None,
        Err(e) => {
            tracing::info!(
                connection_id = %connection_id,
                session_id = %session_id,
                error = %e,
                "Join rejected"
            );
            join_failed(e.into())
        }
    }
}

pub(super) async fn handle_leave_session(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    if !leave(state, connection_id).await {
        return Some(error_response(
            ErrorCode::NotInSession,
            "Connection is not in a session",
        ));
    }
    None
}

pub(super) async fn handle_request_snapshot(
    state: &WsState,
    connection_id: ConnectionId,
    session_id: SessionId,
) -> Option<ServerMessage> {
    if let Err(e) = require_member(state, connection_id, session_id).await {
        return Some(e);
    }

    match state.app.sessions.get(session_id) {
        Some(handle) => Some(ServerMessage::Snapshot {
            session_id,
            state: (*handle.snapshot()).clone(),
        }),
        None => Some(error_response(
            ErrorCode::ServiceUnavailable,
            "Session is not running",
        )),
    }
}

/// Detach a connection from its session.
///
/// Pending approvals of a participant with no remaining connection are
/// dropped, and the session ends once nobody is left in it.
pub(super) async fn leave(state: &WsState, connection_id: ConnectionId) -> bool {
    let Some(membership) = state.connections.leave_session(connection_id).await else {
        return false;
    };
    let session_id = membership.session_id;

    if !state
        .connections
        .is_participant_connected(session_id, membership.participant_id)
        .await
    {
        if let Some(handle) = state.app.sessions.get(session_id) {
            if let Err(e) = handle.participant_left(membership.participant_id).await {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to notify pipeline of departure");
            }
        }
    }

    if state.connections.participant_count(session_id).await == 0 {
        if let Err(e) = state.app.sessions.end_session(session_id).await {
            tracing::error!(session_id = %session_id, error = %e, "Failed to end session");
        }
    }
    true
}
