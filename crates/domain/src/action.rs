//! Action requests - a participant's proposal to change session state

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::ids::{ActionId, ParticipantId};

/// Who submitted a request.
///
/// `is_leader` is stamped by the engine from the submitting connection's
/// role, never taken from the client payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    pub participant_id: ParticipantId,
    pub is_leader: bool,
}

impl Submitter {
    pub fn leader(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            is_leader: true,
        }
    }

    pub fn player(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            is_leader: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub id: ActionId,
    pub action_type: String,
    pub submitter: Submitter,
    #[serde(default)]
    pub parameters: Value,
    pub submitted_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(
        id: ActionId,
        action_type: impl Into<String>,
        submitter: Submitter,
        parameters: Value,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action_type: action_type.into(),
            submitter,
            parameters,
            submitted_at,
        }
    }

    /// Deserialize the parameters into a typed payload.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.parameters.clone()).map_err(|e| {
            DomainError::validation(format!(
                "Invalid parameters for '{}': {e}",
                self.action_type
            ))
        })
    }
}
