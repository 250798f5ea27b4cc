//! SessionState - the root snapshot of a live session
//!
//! Exactly one authoritative copy exists per session (owned by the engine's
//! pipeline); every other copy is a replica kept current through patches.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Document, EncounterState, Token};
use crate::error::DomainError;
use crate::ids::{DocumentId, SessionId, TokenId};
use crate::patch::{self, PatchError, PatchOperation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: SessionId,
    /// Incremented once per applied action; gap-free per session
    pub version: u64,
    #[serde(default)]
    pub documents: BTreeMap<DocumentId, Document>,
    #[serde(default)]
    pub tokens: BTreeMap<TokenId, Token>,
    /// `None` while no encounter is running
    #[serde(default)]
    pub encounter: Option<EncounterState>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            version: 0,
            documents: BTreeMap::new(),
            tokens: BTreeMap::new(),
            encounter: None,
        }
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.insert(document.id, document);
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.tokens.insert(token.id, token);
        self
    }

    pub fn document(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn document_mut(&mut self, id: DocumentId) -> Option<&mut Document> {
        self.documents.get_mut(&id)
    }

    /// Look up a document or fail with a not-found error.
    pub fn require_document(&self, id: DocumentId) -> Result<&Document, DomainError> {
        self.documents
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Document", id.to_string()))
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(&id)
    }

    pub fn token_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.tokens.get_mut(&id)
    }

    pub fn is_encounter_active(&self) -> bool {
        self.encounter.is_some()
    }

    /// JSON Pointer to a document's `state` section.
    pub fn section_pointer(document_id: DocumentId, section: &str) -> String {
        patch::pointer(["documents", &document_id.to_string(), "state", section])
    }

    pub fn to_value(&self) -> Result<Value, PatchError> {
        serde_json::to_value(self).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        serde_json::from_value(value).map_err(|e| PatchError::Serialization(e.to_string()))
    }

    /// Replay a patch batch on a copy of this state.
    ///
    /// All-or-nothing: on error `self` is unchanged and no partial result
    /// escapes.
    pub fn with_patches(&self, ops: &[PatchOperation]) -> Result<Self, PatchError> {
        let patched = patch::apply(&self.to_value()?, ops)?;
        Self::from_value(patched)
    }
}
