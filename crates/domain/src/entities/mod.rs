//! Domain entities - the pieces of a session snapshot

mod document;
mod encounter;
mod session_state;
mod token;

pub use document::{sections, Document, DocumentPath, PathRoot};
pub use encounter::{EncounterState, InitiativeEntry, TurnAdvance};
pub use session_state::SessionState;
pub use token::{BarReading, Position, Token, TokenBar};
