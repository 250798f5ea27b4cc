//! In-memory snapshot store.
//!
//! Keeps the last saved snapshot per session for the life of the process.
//! Hosts that need durability provide their own `SnapshotStore`.

use async_trait::async_trait;
use dashmap::DashMap;

use tablekeep_domain::{SessionId, SessionState};

use crate::infrastructure::ports::{RepoError, SnapshotStore};

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: DashMap<SessionId, SessionState>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot, replacing any previous one.
    pub fn insert(&self, state: SessionState) {
        self.snapshots.insert(state.session_id, state);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, session_id: SessionId) -> Result<Option<SessionState>, RepoError> {
        Ok(self
            .snapshots
            .get(&session_id)
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, state: &SessionState) -> Result<(), RepoError> {
        // Never let an older snapshot overwrite a newer one.
        if let Some(existing) = self.snapshots.get(&state.session_id) {
            if existing.version > state.version {
                return Err(RepoError::storage(
                    "save_snapshot",
                    format!(
                        "stale snapshot v{} for session {} (stored v{})",
                        state.version, state.session_id, existing.version
                    ),
                ));
            }
        }
        self.snapshots.insert(state.session_id, state.clone());
        Ok(())
    }
}
