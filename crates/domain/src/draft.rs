//! Patch-producing state mutation
//!
//! A [`Draft`] is a writable copy of a base [`SessionState`]. Callers mutate
//! it (synchronously or across `.await` points) and then call
//! [`Draft::finish`] to get the new state plus the patches that turn the base
//! into it. Dropping a draft discards every change; the base is never
//! touched.

use crate::entities::SessionState;
use crate::patch::{self, PatchError, PatchOperation};

/// New state plus the patch batch that produces it from the base.
#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub state: SessionState,
    pub patches: Vec<PatchOperation>,
}

impl Produced {
    pub fn is_noop(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Failure of [`produce`]: either the recipe failed or diffing did.
#[derive(Debug, thiserror::Error)]
pub enum ProduceError<E> {
    #[error("Mutation failed: {0}")]
    Recipe(E),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

pub struct Draft<'a> {
    base: &'a SessionState,
    working: SessionState,
}

impl<'a> Draft<'a> {
    pub fn new(base: &'a SessionState) -> Self {
        Self {
            base,
            working: base.clone(),
        }
    }

    pub fn base(&self) -> &SessionState {
        self.base
    }

    pub fn state(&self) -> &SessionState {
        &self.working
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.working
    }

    /// Apply a prepared patch batch to the draft, all-or-nothing.
    pub fn apply(&mut self, ops: &[PatchOperation]) -> Result<(), PatchError> {
        self.working = self.working.with_patches(ops)?;
        Ok(())
    }

    /// Diff the draft against the base.
    pub fn finish(self) -> Result<Produced, PatchError> {
        let patches = patch::diff(&self.base.to_value()?, &self.working.to_value()?);
        Ok(Produced {
            state: self.working,
            patches,
        })
    }
}

/// Run a synchronous recipe against a draft of `base`.
pub fn produce<E, F>(base: &SessionState, recipe: F) -> Result<Produced, ProduceError<E>>
where
    F: FnOnce(&mut SessionState) -> Result<(), E>,
{
    let mut draft = Draft::new(base);
    recipe(draft.state_mut()).map_err(ProduceError::Recipe)?;
    Ok(draft.finish()?)
}
