//! Port traits for infrastructure boundaries.
//!
//! The pipeline and session routing depend on these traits only; adapters
//! live next to them in `infrastructure` (snapshot store, clock) and in
//! `api` (connection-backed broadcaster).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tablekeep_domain::{ParticipantId, SessionId, SessionState};
use tablekeep_shared::ServerMessage;

// =============================================================================
// Errors
// =============================================================================

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Storage backend failed - includes operation name for tracing.
    #[error("Storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepoError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        Self::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Durable home of session snapshots between live sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last saved snapshot, `None` when the session is new.
    async fn load(&self, session_id: SessionId) -> Result<Option<SessionState>, RepoError>;

    async fn save(&self, state: &SessionState) -> Result<(), RepoError>;
}

// =============================================================================
// Delivery
// =============================================================================

/// Outbound delivery to the participants of one session.
///
/// Delivery is best-effort: a full or closed participant channel is logged
/// by the adapter, never reported back to the pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionBroadcaster: Send + Sync {
    async fn send_to_participant(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        message: ServerMessage,
    );

    async fn send_to_leader(&self, session_id: SessionId, message: ServerMessage);

    async fn broadcast(&self, session_id: SessionId, message: ServerMessage);
}

// =============================================================================
// Time
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
