use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use tablekeep_domain::{ActionRequest, DocumentId, EncounterState, SessionState};

use crate::lifecycle::{LifecycleEvent, LifecycleRegistry};
use crate::registry::{ActionHandler, ExecuteError, ValidationError};
use crate::use_cases::{codes, existing_document};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartEncounterParams {
    participants: Vec<InitiativeRoll>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiativeRoll {
    document_id: DocumentId,
    initiative: i32,
}

/// `start-encounter {participants: [{documentId, initiative}]}` (leader only)
pub struct StartEncounter {
    lifecycle: Arc<LifecycleRegistry>,
}

impl StartEncounter {
    pub fn new(lifecycle: Arc<LifecycleRegistry>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ActionHandler for StartEncounter {
    fn restricted_to_leader(&self) -> bool {
        true
    }

    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        if state.is_encounter_active() {
            return Err(ValidationError::new(
                codes::ENCOUNTER_ACTIVE,
                "An encounter is already running",
            ));
        }

        let params: StartEncounterParams = request.params()?;
        if params.participants.is_empty() {
            return Err(ValidationError::new(
                codes::NO_PARTICIPANTS,
                "An encounter needs at least one participant",
            ));
        }

        let mut seen = HashSet::new();
        for roll in &params.participants {
            let document = existing_document(state, roll.document_id)?;
            if !seen.insert(roll.document_id) {
                return Err(ValidationError::new(
                    codes::DUPLICATE_PARTICIPANT,
                    format!("'{}' is listed more than once", document.name),
                ));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let params: StartEncounterParams = request.params()?;
        let encounter = EncounterState::start(
            params
                .participants
                .into_iter()
                .map(|roll| (roll.document_id, roll.initiative))
                .collect(),
        )?;
        let first = encounter.current_turn;
        draft.encounter = Some(encounter);

        if let Some(first) = first {
            self.lifecycle
                .apply_event(LifecycleEvent::Turn, &[first], draft)?;
        }
        Ok(())
    }
}
