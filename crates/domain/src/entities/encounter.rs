//! Encounter entity - round and turn tracking
//!
//! An encounter is either absent from the session (stopped) or active with
//! a round counter, an initiative order, and a pointer at the document whose
//! turn it is. All transitions here are pure; the engine decides who may
//! trigger them.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::DocumentId;

/// One slot in the initiative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiativeEntry {
    pub document_id: DocumentId,
    pub initiative: i32,
    #[serde(default)]
    pub has_acted: bool,
}

/// Result of moving the turn pointer forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAdvance {
    /// Pointer moved to the next entry within the same round
    Next { current: DocumentId },
    /// Pointer wrapped past the last entry and a new round began
    NewRound { current: DocumentId, round: u32 },
}

impl TurnAdvance {
    pub fn current(&self) -> DocumentId {
        match self {
            Self::Next { current } | Self::NewRound { current, .. } => *current,
        }
    }
}

/// Active encounter data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterState {
    pub round: u32,
    pub current_turn: Option<DocumentId>,
    pub initiative: Vec<InitiativeEntry>,
}

impl EncounterState {
    /// Start an encounter at round 1.
    ///
    /// Entries are ordered by descending initiative; equal values keep the
    /// order they were given in.
    pub fn start(entries: Vec<(DocumentId, i32)>) -> Result<Self, DomainError> {
        if entries.is_empty() {
            return Err(DomainError::validation(
                "An encounter needs at least one participant",
            ));
        }
        for (index, (document_id, _)) in entries.iter().enumerate() {
            if entries[..index].iter().any(|(seen, _)| seen == document_id) {
                return Err(DomainError::validation(format!(
                    "Document {document_id} appears twice in the initiative order"
                )));
            }
        }

        let mut initiative: Vec<InitiativeEntry> = entries
            .into_iter()
            .map(|(document_id, initiative)| InitiativeEntry {
                document_id,
                initiative,
                has_acted: false,
            })
            .collect();
        sort_initiative(&mut initiative);

        let current_turn = initiative.first().map(|entry| entry.document_id);
        Ok(Self {
            round: 1,
            current_turn,
            initiative,
        })
    }

    pub fn current_index(&self) -> Option<usize> {
        let current = self.current_turn?;
        self.initiative
            .iter()
            .position(|entry| entry.document_id == current)
    }

    pub fn contains(&self, document_id: DocumentId) -> bool {
        self.initiative
            .iter()
            .any(|entry| entry.document_id == document_id)
    }

    pub fn participants(&self) -> Vec<DocumentId> {
        self.initiative
            .iter()
            .map(|entry| entry.document_id)
            .collect()
    }

    /// Mark the current entry as acted and move to the next one.
    pub fn advance(&mut self) -> Result<TurnAdvance, DomainError> {
        if self.initiative.is_empty() {
            return Err(DomainError::invalid_state_transition(
                "Cannot advance an empty initiative order",
            ));
        }

        let next_index = match self.current_index() {
            Some(index) => {
                self.initiative[index].has_acted = true;
                index + 1
            }
            None => 0,
        };

        if next_index >= self.initiative.len() {
            self.round += 1;
            for entry in &mut self.initiative {
                entry.has_acted = false;
            }
            let current = self.initiative[0].document_id;
            self.current_turn = Some(current);
            Ok(TurnAdvance::NewRound {
                current,
                round: self.round,
            })
        } else {
            let current = self.initiative[next_index].document_id;
            self.current_turn = Some(current);
            Ok(TurnAdvance::Next { current })
        }
    }

    /// Set a document's initiative, appending it when it is not yet in the
    /// order. The turn pointer stays on the same document.
    ///
    /// Returns `true` when a new entry was added.
    pub fn set_initiative(&mut self, document_id: DocumentId, value: i32) -> bool {
        let inserted = match self
            .initiative
            .iter_mut()
            .find(|entry| entry.document_id == document_id)
        {
            Some(entry) => {
                entry.initiative = value;
                false
            }
            None => {
                self.initiative.push(InitiativeEntry {
                    document_id,
                    initiative: value,
                    has_acted: false,
                });
                true
            }
        };
        sort_initiative(&mut self.initiative);
        inserted
    }
}

fn sort_initiative(entries: &mut [InitiativeEntry]) {
    // `sort_by` is stable, which gives the submission-order tie-break.
    entries.sort_by(|a, b| b.initiative.cmp(&a.initiative));
}
