//! Tablekeep Domain - session state types and the patch-producing mutator
//!
//! Pure data and algorithms only: no IO, no async, no transport.
//!
//! - `entities` - documents, tokens, encounters and the session root
//! - `action` - action requests and submitters
//! - `patch` - JSON Pointer patch operations, diff and atomic apply
//! - `draft` - draft-and-diff state mutation

extern crate self as tablekeep_domain;

pub mod action;
pub mod draft;
pub mod entities;
pub mod error;
pub mod ids;
pub mod patch;

pub use action::{ActionRequest, Submitter};
pub use draft::{produce, Draft, ProduceError, Produced};
pub use entities::{
    sections, BarReading, Document, DocumentPath, EncounterState, InitiativeEntry, PathRoot,
    Position, SessionState, Token, TokenBar, TurnAdvance,
};
pub use error::DomainError;
pub use ids::{ActionId, ConnectionId, DocumentId, ParticipantId, SessionId, TokenId};
pub use patch::{PatchError, PatchOp, PatchOperation};
