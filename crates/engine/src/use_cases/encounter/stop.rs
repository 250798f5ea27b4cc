use std::sync::Arc;

use async_trait::async_trait;

use tablekeep_domain::{ActionRequest, SessionState};

use super::{active_encounter, active_encounter_mut};
use crate::lifecycle::{LifecycleEvent, LifecycleRegistry};
use crate::registry::{ActionHandler, ExecuteError, ValidationError};

/// `stop-encounter` (leader only)
pub struct StopEncounter {
    lifecycle: Arc<LifecycleRegistry>,
}

impl StopEncounter {
    pub fn new(lifecycle: Arc<LifecycleRegistry>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ActionHandler for StopEncounter {
    fn restricted_to_leader(&self) -> bool {
        true
    }

    async fn validate(
        &self,
        _request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        active_encounter(state).map(|_| ())
    }

    async fn execute(
        &self,
        _request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let participants = active_encounter_mut(draft)?.participants();
        self.lifecycle
            .apply_event(LifecycleEvent::Encounter, &participants, draft)?;
        draft.encounter = None;
        Ok(())
    }
}
