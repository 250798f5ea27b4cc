//! WebSocket message types for engine-participant communication
//!
//! These types are used by both the engine (sending ServerMessage, receiving
//! ClientMessage) and participants (sending ClientMessage, receiving
//! ServerMessage).
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing variants requires major version bump
//! - Renaming variants is a breaking change
//! - Unknown enum variants deserialize to `Unknown` variant for forward compatibility

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tablekeep_domain::{ActionId, ParticipantId, PatchOperation, SessionId, SessionState};

use crate::responses::{ErrorCode, JoinError, ParticipantRole};

// =============================================================================
// Client Messages (Participant → Engine)
// =============================================================================

/// Messages from a participant to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (and possibly start) a session
    JoinSession {
        session_id: SessionId,
        user_id: String,
        role: ParticipantRole,
    },
    /// Leave the current session
    LeaveSession,
    /// Propose a change to session state
    ActionRequest {
        request_id: ActionId,
        session_id: SessionId,
        action: String,
        #[serde(default)]
        parameters: Value,
    },
    /// Leader approves or denies a suspended request
    ApprovalDecision {
        request_id: ActionId,
        approved: bool,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Ask for a full snapshot after a version gap
    RequestSnapshot { session_id: SessionId },
    /// Heartbeat ping
    Heartbeat,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Server Messages (Engine → Participant)
// =============================================================================

/// Messages from the engine to participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join succeeded; carries the full current snapshot
    SessionJoined {
        session_id: SessionId,
        participant_id: ParticipantId,
        role: ParticipantRole,
        snapshot: SessionState,
    },
    /// Join failed
    SessionJoinFailed {
        session_id: SessionId,
        error: JoinError,
    },
    /// Request is suspended until the leader decides (submitter only)
    ApprovalPending { request_id: ActionId },
    /// Leader must approve or deny a request (leader only)
    ApprovalRequired {
        request_id: ActionId,
        session_id: SessionId,
        action: String,
        submitter_id: ParticipantId,
        message: String,
    },
    /// Request was rejected or failed (submitter only)
    ActionRejected {
        request_id: ActionId,
        error_code: String,
        error_message: String,
    },
    /// Committed change, sent to every participant
    StatePatch {
        session_id: SessionId,
        patches: Vec<PatchOperation>,
        base_version: u64,
        new_version: u64,
    },
    /// Full snapshot (resync reply)
    Snapshot {
        session_id: SessionId,
        state: SessionState,
    },
    /// Transport-level error
    Error { code: ErrorCode, message: String },
    /// Heartbeat response
    Pong,
    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn rejected(
        request_id: ActionId,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::ActionRejected {
            request_id,
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_request_uses_camel_case_fields() {
        let request_id = ActionId::new();
        let session_id = SessionId::new();
        let raw = json!({
            "type": "ActionRequest",
            "requestId": request_id,
            "sessionId": session_id,
            "action": "end-turn",
            "parameters": { "documentId": "x" },
        });

        let msg: ClientMessage = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(
            msg,
            ClientMessage::ActionRequest {
                request_id,
                session_id,
                action: "end-turn".to_string(),
                parameters: json!({ "documentId": "x" }),
            }
        );
    }

    #[test]
    fn missing_parameters_default_to_null() {
        let raw = json!({
            "type": "ActionRequest",
            "requestId": ActionId::new(),
            "sessionId": SessionId::new(),
            "action": "stop-encounter",
        });
        let msg: ClientMessage = serde_json::from_value(raw).expect("deserialize");
        assert!(matches!(
            msg,
            ClientMessage::ActionRequest { parameters: Value::Null, .. }
        ));
    }

    #[test]
    fn unknown_client_message_type_is_tolerated() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "SomethingNew" })).expect("deserialize");
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn state_patch_wire_shape() {
        let session_id = SessionId::new();
        let msg = ServerMessage::StatePatch {
            session_id,
            patches: vec![PatchOperation::replace("/version", json!(4))],
            base_version: 3,
            new_version: 4,
        };

        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["type"], "StatePatch");
        assert_eq!(value["baseVersion"], 3);
        assert_eq!(value["newVersion"], 4);
        assert_eq!(value["patches"][0]["op"], "replace");
    }

    #[test]
    fn rejected_helper_builds_rejection() {
        let id = ActionId::new();
        let msg = ServerMessage::rejected(id, "not_your_turn", "It is not your turn");
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["errorCode"], "not_your_turn");
        assert_eq!(value["errorMessage"], "It is not your turn");
    }
}
