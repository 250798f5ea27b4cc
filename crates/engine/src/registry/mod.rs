//! Action handler registry.
//!
//! Handler lists are published as immutable snapshots behind an `ArcSwap`.
//! Writers build the next snapshot from the current one and swap it in;
//! readers never block and keep whatever snapshot they loaded, so a
//! pipeline run holds on to the handler set it resolved even if an
//! extension unloads while it is executing.

mod handler;

pub use handler::{
    ActionHandler, ExecuteError, HandlerOwner, HandlerRegistration, ValidationError,
};

#[cfg(test)]
pub use handler::MockActionHandler;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Action type must not be empty")]
    EmptyActionType,
}

#[derive(Clone, Default)]
struct RegistrySnapshot {
    by_action: HashMap<String, Arc<[HandlerRegistration]>>,
}

pub struct HandlerRegistry {
    snap: ArcSwap<RegistrySnapshot>,
    next_seq: AtomicU64,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            snap: ArcSwap::from_pointee(RegistrySnapshot::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Add a handler and re-sort the action's list by (priority, registration order).
    pub fn register(
        &self,
        action_type: &str,
        mut registration: HandlerRegistration,
    ) -> Result<(), RegistryError> {
        if action_type.trim().is_empty() {
            return Err(RegistryError::EmptyActionType);
        }
        registration.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            action = action_type,
            owner = %registration.owner,
            priority = registration.priority,
            "Registering action handler"
        );

        self.update(|snap| {
            let mut list: Vec<HandlerRegistration> = snap
                .by_action
                .get(action_type)
                .map(|handlers| handlers.to_vec())
                .unwrap_or_default();
            list.push(registration.clone());
            list.sort_by_key(|r| (r.priority, r.seq));
            snap.by_action.insert(action_type.to_string(), list.into());
            0
        });
        Ok(())
    }

    /// Remove the handlers `owner` registered for one action type.
    pub fn unregister(&self, action_type: &str, owner: &HandlerOwner) -> usize {
        self.update(|snap| remove_owned(snap, Some(action_type), owner))
    }

    /// Remove every handler `owner` registered, across all action types.
    pub fn unregister_all(&self, owner: &HandlerOwner) -> usize {
        let removed = self.update(|snap| remove_owned(snap, None, owner));
        tracing::debug!(owner = %owner, removed, "Unregistered action handlers");
        removed
    }

    /// Ordered handlers for an action type (empty when none are registered).
    pub fn get_handlers(&self, action_type: &str) -> Arc<[HandlerRegistration]> {
        self.snap
            .load()
            .by_action
            .get(action_type)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Action types with at least one handler, sorted.
    pub fn action_types(&self) -> Vec<String> {
        let snap = self.snap.load();
        let mut types: Vec<String> = snap.by_action.keys().cloned().collect();
        types.sort();
        types
    }

    /// Copy-on-write update: build the next snapshot and retry until the
    /// swap lands on the snapshot it was built from.
    fn update<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&mut RegistrySnapshot) -> usize,
    {
        loop {
            let cur = self.snap.load_full();
            let mut next = (*cur).clone();
            let result = f(&mut next);

            let prev = self.snap.compare_and_swap(&cur, Arc::new(next));
            if Arc::ptr_eq(&prev, &cur) {
                return result;
            }
        }
    }
}

fn remove_owned(
    snap: &mut RegistrySnapshot,
    action_type: Option<&str>,
    owner: &HandlerOwner,
) -> usize {
    let mut removed = 0;
    snap.by_action.retain(|action, handlers| {
        if action_type.is_some_and(|only| only != action.as_str()) {
            return true;
        }
        let before = handlers.len();
        let kept: Vec<HandlerRegistration> = handlers
            .iter()
            .filter(|r| &r.owner != owner)
            .cloned()
            .collect();
        removed += before - kept.len();
        if kept.len() != before {
            *handlers = kept.into();
        }
        !handlers.is_empty()
    });
    removed
}
