//! Session boundary reset.

use std::sync::Arc;

use async_trait::async_trait;

use tablekeep_domain::{ActionRequest, DocumentId, SessionState};

use crate::lifecycle::{LifecycleEvent, LifecycleRegistry};
use crate::registry::{ActionHandler, ExecuteError, ValidationError};

pub const RESET_SESSION: &str = "reset-session";

/// `reset-session` (leader only): applies the session defaults to every
/// document in the session.
pub struct ResetSession {
    lifecycle: Arc<LifecycleRegistry>,
}

impl ResetSession {
    pub fn new(lifecycle: Arc<LifecycleRegistry>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ActionHandler for ResetSession {
    fn restricted_to_leader(&self) -> bool {
        true
    }

    fn approval_message(&self, _request: &ActionRequest) -> Option<String> {
        Some("Reset every document's session state?".to_string())
    }

    async fn validate(
        &self,
        _request: &ActionRequest,
        _state: &SessionState,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    async fn execute(
        &self,
        _request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let documents: Vec<DocumentId> = draft.documents.keys().copied().collect();
        let applied = self
            .lifecycle
            .apply_event(LifecycleEvent::Session, &documents, draft)?;
        tracing::info!(session_id = %draft.session_id, resets = applied, "Session state reset");
        Ok(())
    }
}
