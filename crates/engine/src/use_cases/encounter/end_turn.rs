use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use tablekeep_domain::{ActionRequest, DocumentId, SessionState, TurnAdvance};

use super::{active_encounter, active_encounter_mut};
use crate::lifecycle::{LifecycleEvent, LifecycleRegistry};
use crate::registry::{ActionHandler, ExecuteError, ValidationError};
use crate::use_cases::{codes, require_control};

/// Naming the document (and the round) being ended makes a duplicate
/// submission fail validation instead of skipping a turn.
///
/// With a single combatant the pointer never leaves that document, so the
/// round is the only thing that tells two submissions apart and is required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndTurnParams {
    document_id: DocumentId,
    #[serde(default)]
    round: Option<u32>,
}

/// `end-turn {documentId, round?}`; `round` is mandatory for a one-entry order.
pub struct EndTurn {
    lifecycle: Arc<LifecycleRegistry>,
}

impl EndTurn {
    pub fn new(lifecycle: Arc<LifecycleRegistry>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl ActionHandler for EndTurn {
    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError> {
        let encounter = active_encounter(state)?;
        let params: EndTurnParams = request.params()?;

        if encounter.current_turn != Some(params.document_id) {
            return Err(ValidationError::new(
                codes::NOT_YOUR_TURN,
                "That document's turn is not the current one",
            ));
        }
        match params.round {
            Some(round) if round != encounter.round => {
                return Err(ValidationError::new(
                    codes::STALE_ROUND,
                    format!("Round {round} is over; the encounter is in round {}", encounter.round),
                ));
            }
            Some(_) => {}
            None if encounter.initiative.len() == 1 => {
                return Err(ValidationError::invalid_parameters(
                    "end-turn needs 'round' when the encounter has a single participant",
                ));
            }
            None => {}
        }
        require_control(state, params.document_id, &request.submitter)
    }

    async fn execute(
        &self,
        _request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError> {
        let encounter = active_encounter_mut(draft)?;
        let advance = encounter.advance()?;
        let affected = match advance {
            TurnAdvance::NewRound { .. } => encounter.participants(),
            TurnAdvance::Next { current } => vec![current],
        };

        tracing::debug!(
            current = %advance.current(),
            round = encounter.round,
            "Turn advanced"
        );

        self.lifecycle
            .apply_event(LifecycleEvent::Turn, &affected, draft)?;
        Ok(())
    }
}
