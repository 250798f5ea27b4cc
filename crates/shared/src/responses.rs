//! Shared vocabulary for responses: roles, join errors, error codes

use serde::{Deserialize, Serialize};

// =============================================================================
// Session Roles
// =============================================================================

/// Role of a participant in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Session leader - hosts the authority, approves requests
    Leader,
    /// Player - submits requests for the documents they own
    Player,
    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ParticipantRole {
    /// Check if this role is the leader
    pub fn is_leader(&self) -> bool {
        matches!(self, ParticipantRole::Leader)
    }

    /// Check if this role may submit action requests
    pub fn can_submit(&self) -> bool {
        matches!(self, ParticipantRole::Leader | ParticipantRole::Player)
    }
}

/// Errors that can occur when joining a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JoinError {
    /// Another user already leads this session
    LeaderAlreadyConnected { existing_user_id: String },
    /// The connection already belongs to a session
    AlreadyInSession,
    /// The session could not be started
    SessionUnavailable { message: String },
    /// Role is not accepted for joining
    InvalidRole,
    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Error Codes
// =============================================================================

/// Error classification codes for transport-level errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request was malformed or invalid
    BadRequest,
    /// User lacks permission for this operation
    Forbidden,
    /// Requested resource not found
    NotFound,
    /// Connection has not joined a session
    NotInSession,
    /// Internal server error
    InternalError,
    /// Required service is unavailable
    ServiceUnavailable,

    /// Unknown variant for forward compatibility
    #[serde(other)]
    Unknown,
}

/// Rejection codes carried by `ServerMessage::ActionRejected`.
///
/// Handlers may use their own codes for validation failures; these are the
/// ones the pipeline itself emits.
pub mod rejection_codes {
    pub const UNKNOWN_ACTION: &str = "unknown_action";
    pub const LEADER_ONLY: &str = "leader_only";
    pub const INVALID_PARAMETERS: &str = "invalid_parameters";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const APPROVAL_DENIED: &str = "approval_denied";
    pub const APPROVAL_EXPIRED: &str = "approval_expired";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const SESSION_CLOSED: &str = "session_closed";
    /// The request id is already waiting for the leader
    pub const DUPLICATE_REQUEST: &str = "duplicate_request";
}
