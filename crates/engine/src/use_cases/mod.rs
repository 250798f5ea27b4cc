//! Use cases - the core action handlers.
//!
//! Each module contributes handlers for one area of play. They are
//! registered through the same extension context third-party code uses,
//! owned by `HandlerOwner::Core` at priority 0.

pub mod encounter;
pub mod session_reset;
pub mod tokens;

use std::sync::Arc;

use tablekeep_domain::{Document, DocumentId, SessionState, Submitter};

use crate::extensions::ExtensionContext;
use crate::lifecycle::LifecycleResets;
use crate::registry::{RegistryError, ValidationError};

pub use encounter::{EndTurn, RollInitiative, StartEncounter, StopEncounter};
pub use session_reset::ResetSession;
pub use tokens::{MoveToken, SetTokenVisibility};

/// Priority of every core handler; extensions order themselves around it.
pub const CORE_PRIORITY: i32 = 0;

/// Rejection codes emitted by core handlers.
pub mod codes {
    pub const ENCOUNTER_ACTIVE: &str = "encounter_active";
    pub const ENCOUNTER_NOT_ACTIVE: &str = "encounter_not_active";
    pub const NO_PARTICIPANTS: &str = "no_participants";
    pub const DUPLICATE_PARTICIPANT: &str = "duplicate_participant";
    pub const DOCUMENT_NOT_FOUND: &str = "document_not_found";
    pub const TOKEN_NOT_FOUND: &str = "token_not_found";
    pub const NOT_YOUR_TURN: &str = "not_your_turn";
    pub const STALE_ROUND: &str = "stale_round";
    pub const NOT_DOCUMENT_OWNER: &str = "not_document_owner";
    pub const NOT_IN_ENCOUNTER: &str = "not_in_encounter";
    pub const INVALID_POSITION: &str = "invalid_position";
}

/// Register the core handlers and lifecycle defaults.
pub fn register_core(ctx: &mut ExtensionContext) -> Result<(), RegistryError> {
    ctx.register_lifecycle(LifecycleResets::core_defaults());
    let lifecycle = ctx.lifecycle();

    ctx.register_handler(
        encounter::START_ENCOUNTER,
        CORE_PRIORITY,
        Arc::new(StartEncounter::new(lifecycle.clone())),
    )?;
    ctx.register_handler(
        encounter::END_TURN,
        CORE_PRIORITY,
        Arc::new(EndTurn::new(lifecycle.clone())),
    )?;
    ctx.register_handler(
        encounter::STOP_ENCOUNTER,
        CORE_PRIORITY,
        Arc::new(StopEncounter::new(lifecycle.clone())),
    )?;
    ctx.register_handler(
        encounter::ROLL_INITIATIVE,
        CORE_PRIORITY,
        Arc::new(RollInitiative),
    )?;
    ctx.register_handler(tokens::MOVE_TOKEN, CORE_PRIORITY, Arc::new(MoveToken))?;
    ctx.register_handler(
        tokens::SET_TOKEN_VISIBILITY,
        CORE_PRIORITY,
        Arc::new(SetTokenVisibility),
    )?;
    ctx.register_handler(
        session_reset::RESET_SESSION,
        CORE_PRIORITY,
        Arc::new(ResetSession::new(lifecycle)),
    )?;
    Ok(())
}

/// Look up a document for validation.
fn existing_document(state: &SessionState, id: DocumentId) -> Result<&Document, ValidationError> {
    state.document(id).ok_or_else(|| {
        ValidationError::new(codes::DOCUMENT_NOT_FOUND, format!("Document {id} does not exist"))
    })
}

/// The leader controls everything; players control the documents they own.
fn require_control(
    state: &SessionState,
    id: DocumentId,
    submitter: &Submitter,
) -> Result<(), ValidationError> {
    let document = existing_document(state, id)?;
    if submitter.is_leader || document.is_owned_by(submitter.participant_id) {
        return Ok(());
    }
    Err(ValidationError::new(
        codes::NOT_DOCUMENT_OWNER,
        format!("You do not control '{}'", document.name),
    ))
}
