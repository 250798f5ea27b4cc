//! Participant-side session replica
//!
//! A replica starts from the snapshot delivered on join and then applies
//! every `StatePatch` in version order. A patch whose base version does not
//! match the local version means a message was missed; the replica reports
//! the gap and the participant asks for a fresh snapshot.

use tablekeep_domain::{PatchError, PatchOperation, SessionId, SessionState};

use crate::messages::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("Replica out of sync: at version {local}, patch based on {base}")]
    Desync { local: u64, base: u64 },
    #[error("Message for session {received} delivered to replica of {expected}")]
    SessionMismatch {
        expected: SessionId,
        received: SessionId,
    },
    #[error("Patch batch ended at version {actual}, expected {expected}")]
    VersionMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// What a handled message did to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaUpdate {
    /// Patches applied; replica is now at this version
    Applied(u64),
    /// Full snapshot installed at this version
    Replaced(u64),
    /// Patch already reflected locally (duplicate delivery)
    Stale,
    /// Message does not touch session state
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Replica {
    state: SessionState,
}

impl Replica {
    pub fn new(snapshot: SessionState) -> Self {
        Self { state: snapshot }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn session_id(&self) -> SessionId {
        self.state.session_id
    }

    /// Apply one committed patch batch.
    ///
    /// On error the replica is unchanged.
    pub fn apply_patch(
        &mut self,
        session_id: SessionId,
        patches: &[PatchOperation],
        base_version: u64,
        new_version: u64,
    ) -> Result<ReplicaUpdate, ReplicaError> {
        self.check_session(session_id)?;

        if new_version <= self.state.version {
            tracing::debug!(
                local = self.state.version,
                new_version,
                "Ignoring already-applied patch"
            );
            return Ok(ReplicaUpdate::Stale);
        }
        if base_version != self.state.version {
            return Err(ReplicaError::Desync {
                local: self.state.version,
                base: base_version,
            });
        }

        let next = self.state.with_patches(patches)?;
        if next.version != new_version {
            return Err(ReplicaError::VersionMismatch {
                expected: new_version,
                actual: next.version,
            });
        }

        self.state = next;
        Ok(ReplicaUpdate::Applied(new_version))
    }

    /// Install a full snapshot, discarding local state.
    pub fn replace(&mut self, snapshot: SessionState) -> Result<ReplicaUpdate, ReplicaError> {
        self.check_session(snapshot.session_id)?;
        let version = snapshot.version;
        self.state = snapshot;
        Ok(ReplicaUpdate::Replaced(version))
    }

    /// Route a server message to the matching replica operation.
    pub fn handle(&mut self, msg: &ServerMessage) -> Result<ReplicaUpdate, ReplicaError> {
        match msg {
            ServerMessage::StatePatch {
                session_id,
                patches,
                base_version,
                new_version,
            } => self.apply_patch(*session_id, patches, *base_version, *new_version),
            ServerMessage::Snapshot { state, .. } => self.replace(state.clone()),
            _ => Ok(ReplicaUpdate::Ignored),
        }
    }

    /// Message asking the engine for a full snapshot of this session.
    pub fn resync_request(&self) -> ClientMessage {
        ClientMessage::RequestSnapshot {
            session_id: self.state.session_id,
        }
    }

    fn check_session(&self, received: SessionId) -> Result<(), ReplicaError> {
        if received != self.state.session_id {
            return Err(ReplicaError::SessionMismatch {
                expected: self.state.session_id,
                received,
            });
        }
        Ok(())
    }
}
