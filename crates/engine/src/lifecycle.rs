//! Lifecycle-scoped document state resets.
//!
//! Owners (core or an extension) declare which `state` sections of a
//! document reset on turn, encounter and session boundaries, and to what.
//! Handlers ask for the reset batch of an event and apply it to their
//! draft, so the resets land in the same atomic pipeline batch as the
//! handler's own bookkeeping.

use parking_lot::RwLock;
use serde_json::{Map, Value};

use tablekeep_domain::{sections, DocumentId, PatchError, PatchOperation, SessionState};

use crate::registry::HandlerOwner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A document's turn starts
    Turn,
    /// The encounter stops
    Encounter,
    /// The session is reset
    Session,
}

/// Section defaults declared by one owner, per event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleResets {
    pub turn_reset: Option<Map<String, Value>>,
    pub encounter_reset: Option<Map<String, Value>>,
    pub session_reset: Option<Map<String, Value>>,
}

impl LifecycleResets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_turn(mut self, section: impl Into<String>, default: Value) -> Self {
        self.turn_reset
            .get_or_insert_with(Map::new)
            .insert(section.into(), default);
        self
    }

    pub fn on_encounter(mut self, section: impl Into<String>, default: Value) -> Self {
        self.encounter_reset
            .get_or_insert_with(Map::new)
            .insert(section.into(), default);
        self
    }

    pub fn on_session(mut self, section: impl Into<String>, default: Value) -> Self {
        self.session_reset
            .get_or_insert_with(Map::new)
            .insert(section.into(), default);
        self
    }

    /// Resets the engine itself declares.
    pub fn core_defaults() -> Self {
        Self::new()
            .on_turn(sections::TURN_STATE, Value::Object(Map::new()))
            .on_encounter(sections::ENCOUNTER_STATE, Value::Object(Map::new()))
            .on_encounter(sections::TURN_STATE, Value::Object(Map::new()))
            .on_session(sections::SESSION_STATE, Value::Object(Map::new()))
    }

    fn for_event(&self, event: LifecycleEvent) -> Option<&Map<String, Value>> {
        match event {
            LifecycleEvent::Turn => self.turn_reset.as_ref(),
            LifecycleEvent::Encounter => self.encounter_reset.as_ref(),
            LifecycleEvent::Session => self.session_reset.as_ref(),
        }
    }
}

/// One replace patch setting a document's section to `default`.
pub fn reset_section(document_id: DocumentId, section: &str, default: Value) -> PatchOperation {
    PatchOperation::replace(SessionState::section_pointer(document_id, section), default)
}

#[derive(Default)]
pub struct LifecycleRegistry {
    registrations: RwLock<Vec<(HandlerOwner, LifecycleResets)>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an owner's resets. Registration order decides merge precedence.
    pub fn register_lifecycle(&self, owner: HandlerOwner, resets: LifecycleResets) {
        tracing::debug!(owner = %owner, "Registering lifecycle resets");
        self.registrations.write().push((owner, resets));
    }

    /// Drop every registration of `owner`; returns how many were removed.
    pub fn unregister_lifecycle(&self, owner: &HandlerOwner) -> usize {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|(o, _)| o != owner);
        before - registrations.len()
    }

    /// Effective section defaults for an event across all owners.
    ///
    /// Object defaults for the same section are shallow-merged in
    /// registration order (later keys win); any non-object default replaces
    /// what came before it.
    pub fn defaults_for(&self, event: LifecycleEvent) -> Vec<(String, Value)> {
        let registrations = self.registrations.read();
        let mut merged: Vec<(String, Value)> = Vec::new();

        for (_, resets) in registrations.iter() {
            let Some(declared) = resets.for_event(event) else {
                continue;
            };
            for (section, default) in declared {
                match merged.iter_mut().find(|(name, _)| name == section) {
                    Some((_, existing)) => merge_default(existing, default),
                    None => merged.push((section.clone(), default.clone())),
                }
            }
        }
        merged
    }

    /// Reset patches for `event` on every affected document that exists.
    pub fn on_lifecycle_event(
        &self,
        event: LifecycleEvent,
        affected: &[DocumentId],
        state: &SessionState,
    ) -> Vec<PatchOperation> {
        let defaults = self.defaults_for(event);
        if defaults.is_empty() {
            return Vec::new();
        }

        let mut ops = Vec::new();
        for &document_id in affected {
            if state.document(document_id).is_none() {
                tracing::debug!(document_id = %document_id, ?event, "Skipping reset for missing document");
                continue;
            }
            for (section, default) in &defaults {
                ops.push(reset_section(document_id, section, default.clone()));
            }
        }
        ops
    }

    /// Build the reset batch for `event` and apply it to a handler's draft.
    ///
    /// Returns the number of section resets applied.
    pub fn apply_event(
        &self,
        event: LifecycleEvent,
        affected: &[DocumentId],
        draft: &mut SessionState,
    ) -> Result<usize, PatchError> {
        let ops = self.on_lifecycle_event(event, affected, draft);
        if ops.is_empty() {
            return Ok(0);
        }
        *draft = draft.with_patches(&ops)?;
        Ok(ops.len())
    }
}

fn merge_default(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(extra)) => {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
