use tablekeep_domain::{ActionId, ConnectionId};
use tablekeep_shared::{ErrorCode, ServerMessage};

use super::*;
use crate::pipeline::PipelineError;

pub(super) async fn handle_approval_decision(
    state: &WsState,
    connection_id: ConnectionId,
    request_id: ActionId,
    approved: bool,
    reason: Option<String>,
) -> Option<ServerMessage> {
    let conn_info = match state.connections.get(connection_id).await {
        Some(info) => info,
        None => {
            return Some(error_response(
                ErrorCode::BadRequest,
                "Connection not found",
            ))
        }
    };

    if let Err(e) = require_leader(&conn_info) {
        return Some(e);
    }
    let Some(session_id) = conn_info.session_id else {
        return Some(error_response(ErrorCode::NotInSession, "Join a session first"));
    };
    let Some(handle) = state.app.sessions.get(session_id) else {
        return Some(error_response(
            ErrorCode::ServiceUnavailable,
            "Session is not running",
        ));
    };

    match handle.decide(request_id, approved, reason).await {
        Ok(outcome) => {
            tracing::info!(
                session_id = %session_id,
                request_id = %request_id,
                approved,
                ?outcome,
                "Approval decision applied"
            );
            None
        }
        Err(PipelineError::UnknownApproval(_)) => Some(error_response(
            ErrorCode::NotFound,
            "No pending request with that id",
        )),
        Err(e @ PipelineError::Closed(_)) => {
            tracing::warn!(session_id = %session_id, error = %e, "Session pipeline unavailable");
            Some(error_response(
                ErrorCode::ServiceUnavailable,
                "Session is not running",
            ))
        }
    }
}
