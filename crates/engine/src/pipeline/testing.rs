//! Test doubles for pipeline delivery.

use async_trait::async_trait;
use parking_lot::Mutex;

use tablekeep_domain::{ParticipantId, SessionId};
use tablekeep_shared::ServerMessage;

use crate::infrastructure::ports::SessionBroadcaster;

#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Participant(ParticipantId),
    Leader,
    Everyone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub session_id: SessionId,
    pub to: Recipient,
    pub message: ServerMessage,
}

/// Broadcaster that records every delivery in order.
#[derive(Default)]
pub struct RecordingBroadcaster {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn broadcasts(&self) -> Vec<ServerMessage> {
        self.filtered(|to| matches!(to, Recipient::Everyone))
    }

    pub fn to_leader(&self) -> Vec<ServerMessage> {
        self.filtered(|to| matches!(to, Recipient::Leader))
    }

    pub fn to_participant(&self, participant_id: ParticipantId) -> Vec<ServerMessage> {
        self.filtered(|to| *to == Recipient::Participant(participant_id))
    }

    fn filtered<F: Fn(&Recipient) -> bool>(&self, f: F) -> Vec<ServerMessage> {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| f(&d.to))
            .map(|d| d.message.clone())
            .collect()
    }

    fn record(&self, session_id: SessionId, to: Recipient, message: ServerMessage) {
        self.deliveries.lock().push(Delivery {
            session_id,
            to,
            message,
        });
    }
}

#[async_trait]
impl SessionBroadcaster for RecordingBroadcaster {
    async fn send_to_participant(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        message: ServerMessage,
    ) {
        self.record(session_id, Recipient::Participant(participant_id), message);
    }

    async fn send_to_leader(&self, session_id: SessionId, message: ServerMessage) {
        self.record(session_id, Recipient::Leader, message);
    }

    async fn broadcast(&self, session_id: SessionId, message: ServerMessage) {
        self.record(session_id, Recipient::Everyone, message);
    }
}
