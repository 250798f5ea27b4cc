//! Turn/round state machine.
//!
//! STOPPED while `SessionState::encounter` is `None`, ACTIVE otherwise.
//! Every transition is an ordinary pipeline action, so extensions can hook
//! any of them with their own handlers.

mod end_turn;
mod initiative;
mod start;
mod stop;


pub use end_turn::EndTurn;
pub use initiative::RollInitiative;
pub use start::StartEncounter;
pub use stop::StopEncounter;

use tablekeep_domain::{EncounterState, SessionState};

use crate::registry::{ExecuteError, ValidationError};
use crate::use_cases::codes;

pub const START_ENCOUNTER: &str = "start-encounter";
pub const END_TURN: &str = "end-turn";
pub const STOP_ENCOUNTER: &str = "stop-encounter";
pub const ROLL_INITIATIVE: &str = "roll-initiative";

fn active_encounter(state: &SessionState) -> Result<&EncounterState, ValidationError> {
    state.encounter.as_ref().ok_or_else(|| {
        ValidationError::new(codes::ENCOUNTER_NOT_ACTIVE, "No encounter is running")
    })
}

fn active_encounter_mut(draft: &mut SessionState) -> Result<&mut EncounterState, ExecuteError> {
    draft.encounter.as_mut().ok_or_else(|| {
        tablekeep_domain::DomainError::invalid_state_transition("No encounter is running").into()
    })
}
