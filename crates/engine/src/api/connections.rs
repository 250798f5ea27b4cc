//! Connection management for WebSocket clients.
//!
//! Tracks connected clients, the session each one joined, and its role
//! there. Also the delivery side of the pipeline: messages are routed to
//! one participant, the leader, or every participant of a session.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use tablekeep_domain::{ConnectionId, ParticipantId, SessionId};
use tablekeep_shared::{JoinError, ParticipantRole, ServerMessage};

use crate::infrastructure::ports::SessionBroadcaster;

/// Stable participant id for a user, so reconnects keep ownership.
pub fn participant_id_for(user_id: &str) -> ParticipantId {
    ParticipantId::from_uuid(Uuid::new_v5(&Uuid::NAMESPACE_OID, user_id.as_bytes()))
}

/// Information about a connected client.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    /// Set on join
    pub user_id: Option<String>,
    pub participant_id: Option<ParticipantId>,
    pub session_id: Option<SessionId>,
    pub role: Option<ParticipantRole>,
}

impl ConnectionInfo {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_id: None,
            participant_id: None,
            session_id: None,
            role: None,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role.is_some_and(|role| role.is_leader())
    }

    fn in_session(&self, session_id: SessionId) -> bool {
        self.session_id == Some(session_id)
    }
}

/// Membership established by a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub role: ParticipantRole,
}

/// Manages all active WebSocket connections.
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, (ConnectionInfo, mpsc::Sender<ServerMessage>)>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection_id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, (ConnectionInfo::new(connection_id), sender));
        tracing::debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Forget a connection, returning what it was.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&connection_id).map(|(info, _)| info);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).map(|(info, _)| info.clone())
    }

    /// Join a session. A session has at most one leader connection.
    ///
    /// `welcome` runs under the connection table lock and its message is
    /// queued before any session traffic can reach the connection, so a
    /// snapshot taken there is never older than the patches that follow it.
    pub async fn join_session<F>(
        &self,
        connection_id: ConnectionId,
        session_id: SessionId,
        user_id: String,
        role: ParticipantRole,
        welcome: F,
    ) -> Result<Membership, ConnectionError>
    where
        F: FnOnce(ParticipantId) -> Option<ServerMessage>,
    {
        if !role.can_submit() {
            return Err(ConnectionError::InvalidRole);
        }

        let mut connections = self.connections.write().await;

        if role.is_leader() {
            let existing = connections.iter().find(|(id, (info, _))| {
                **id != connection_id && info.in_session(session_id) && info.is_leader()
            });
            if let Some((_, (info, _))) = existing {
                return Err(ConnectionError::LeaderAlreadyConnected {
                    existing_user_id: info.user_id.clone().unwrap_or_default(),
                });
            }
        }

        let (info, sender) = connections
            .get_mut(&connection_id)
            .ok_or(ConnectionError::NotFound)?;
        if info.session_id.is_some() {
            return Err(ConnectionError::AlreadyInSession);
        }

        let participant_id = participant_id_for(&user_id);
        info.user_id = Some(user_id);
        info.participant_id = Some(participant_id);
        info.session_id = Some(session_id);
        info.role = Some(role);

        if let Some(message) = welcome(participant_id) {
            if let Err(e) = sender.try_send(message) {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to queue join reply");
            }
        }

        tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            participant_id = %participant_id,
            ?role,
            "Connection joined session"
        );
        Ok(Membership {
            session_id,
            participant_id,
            role,
        })
    }

    /// Leave the current session, returning the membership that ended.
    pub async fn leave_session(&self, connection_id: ConnectionId) -> Option<Membership> {
        let mut connections = self.connections.write().await;
        let (info, _) = connections.get_mut(&connection_id)?;

        let membership = Membership {
            session_id: info.session_id.take()?,
            participant_id: info.participant_id.take()?,
            role: info.role.take()?,
        };
        tracing::info!(
            connection_id = %connection_id,
            session_id = %membership.session_id,
            "Connection left session"
        );
        Some(membership)
    }

    pub async fn session_connections(&self, session_id: SessionId) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|(info, _)| info.in_session(session_id))
            .map(|(info, _)| info.clone())
            .collect()
    }

    /// Number of connections joined to a session.
    pub async fn participant_count(&self, session_id: SessionId) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|(info, _)| info.in_session(session_id))
            .count()
    }

    /// Whether the participant still has any connection in the session.
    pub async fn is_participant_connected(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> bool {
        let connections = self.connections.read().await;
        connections.values().any(|(info, _)| {
            info.in_session(session_id) && info.participant_id == Some(participant_id)
        })
    }

    async fn deliver<F>(&self, session_id: SessionId, message: ServerMessage, target: &str, f: F)
    where
        F: Fn(&ConnectionInfo) -> bool,
    {
        let connections = self.connections.read().await;
        for (info, sender) in connections.values() {
            if info.in_session(session_id) && f(info) {
                if let Err(e) = sender.try_send(message.clone()) {
                    tracing::warn!(
                        connection_id = %info.connection_id,
                        session_id = %session_id,
                        target,
                        error = %e,
                        "Failed to deliver message"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl SessionBroadcaster for ConnectionManager {
    async fn send_to_participant(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        message: ServerMessage,
    ) {
        self.deliver(session_id, message, "participant", |info| {
            info.participant_id == Some(participant_id)
        })
        .await;
    }

    async fn send_to_leader(&self, session_id: SessionId, message: ServerMessage) {
        self.deliver(session_id, message, "leader", ConnectionInfo::is_leader)
            .await;
    }

    async fn broadcast(&self, session_id: SessionId, message: ServerMessage) {
        self.deliver(session_id, message, "session", |_| true).await;
    }
}

/// Errors that can occur during connection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection not found")]
    NotFound,
    #[error("Connection already joined a session")]
    AlreadyInSession,
    #[error("Session already has a leader ({existing_user_id})")]
    LeaderAlreadyConnected { existing_user_id: String },
    #[error("Role cannot join a session")]
    InvalidRole,
}

impl From<ConnectionError> for JoinError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::LeaderAlreadyConnected { existing_user_id } => {
                JoinError::LeaderAlreadyConnected { existing_user_id }
            }
            ConnectionError::AlreadyInSession => JoinError::AlreadyInSession,
            ConnectionError::InvalidRole => JoinError::InvalidRole,
            ConnectionError::NotFound => JoinError::SessionUnavailable {
                message: "Connection is no longer registered".to_string(),
            },
        }
    }
}
