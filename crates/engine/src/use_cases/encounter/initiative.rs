use async_trait::async_trait;
use serde::Deserialize;

use tablekeep_domain::{ActionRequest, DocumentId, SessionState};

use super::{active_encounter, active_encounter_mut};
use crate::registry::{ActionHandler, ExecuteError, ValidationError};
use crate::use_cases::{codes, require_control};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollInitiativeParams {
    document_id: DocumentId,
    initiative: i32,
}

/// `roll-initiative {documentId, initiative}`
///
/// Updates an entry in place or, for the leader, adds a latecomer.
pub struct RollInitiative;

#[async_trait]
impl ActionHandler for RollInitiative {
    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        let encounter = active_encounter(state)?;
        let params: RollInitiativeParams = request.params()?;
        require_control(state, params.document_id, &request.submitter)?;

        if !encounter.contains(params.document_id) && !request.submitter.is_leader {
            return Err(ValidationError::new(
                codes::NOT_IN_ENCOUNTER,
                "Only the session leader may add a document to the encounter",
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let params: RollInitiativeParams = request.params()?;
        let inserted = active_encounter_mut(draft)?.set_initiative(params.document_id, params.initiative);
        if inserted {
            tracing::debug!(document_id = %params.document_id, "Document joined the encounter");
        }
        Ok(())
    }
}
