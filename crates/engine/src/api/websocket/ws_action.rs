use serde_json::Value;

use tablekeep_domain::{ActionId, ActionRequest, ConnectionId, SessionId, Submitter};
use tablekeep_shared::{ErrorCode, ServerMessage};

use super::*;

/// Stamp the submitter from the connection and hand the request to the
/// session pipeline. Outcomes reach the client through the broadcaster.
pub(super) async fn handle_action_request(
    state: &WsState,
    connection_id: ConnectionId,
    request_id: ActionId,
    session_id: SessionId,
    action: String,
    parameters: Value,
) -> Option<ServerMessage> {
    let info = match require_member(state, connection_id, session_id).await {
        Ok(info) => info,
        Err(e) => return Some(e),
    };
    let (Some(participant_id), Some(role)) = (info.participant_id, info.role) else {
        return Some(error_response(ErrorCode::NotInSession, "Join a session first"));
    };
    if !role.can_submit() {
        return Some(error_response(
            ErrorCode::Forbidden,
            "This role cannot submit actions",
        ));
    }

    let Some(handle) = state.app.sessions.get(session_id) else {
        return Some(error_response(
            ErrorCode::ServiceUnavailable,
            "Session is not running",
        ));
    };

    let submitter = Submitter {
        participant_id,
        is_leader: role.is_leader(),
    };
    let request = ActionRequest::new(
        request_id,
        action,
        submitter,
        parameters,
        state.app.clock.now(),
    );

    match handle.submit(request).await {
        Ok(outcome) => {
            tracing::debug!(
                connection_id = %connection_id,
                request_id = %request_id,
                ?outcome,
                "Action processed"
            );
            None
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "Session pipeline unavailable");
            Some(error_response(
                ErrorCode::ServiceUnavailable,
                "Session is not running",
            ))
        }
    }
}
