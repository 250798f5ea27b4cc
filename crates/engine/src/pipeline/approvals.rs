//! Requests suspended until the session leader decides.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use tablekeep_domain::{ActionId, ActionRequest, ParticipantId};

use crate::registry::HandlerRegistration;

/// A suspended request and the handler set resolved when it was submitted.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub request: ActionRequest,
    pub handlers: Arc<[HandlerRegistration]>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PendingApprovals {
    entries: HashMap<ActionId, PendingApproval>,
    ttl: Duration,
}

impl PendingApprovals {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }

    pub fn insert(
        &mut self,
        request: ActionRequest,
        handlers: Arc<[HandlerRegistration]>,
        now: DateTime<Utc>,
    ) {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            request.id,
            PendingApproval {
                request,
                handlers,
                expires_at,
            },
        );
    }

    pub fn contains(&self, request_id: ActionId) -> bool {
        self.entries.contains_key(&request_id)
    }

    pub fn remove(&mut self, request_id: ActionId) -> Option<PendingApproval> {
        self.entries.remove(&request_id)
    }

    /// Drop every request a participant submitted.
    pub fn remove_by_submitter(&mut self, participant_id: ParticipantId) -> Vec<PendingApproval> {
        self.take_where(|p| p.request.submitter.participant_id == participant_id)
    }

    /// Remove and return entries whose deadline has passed.
    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Vec<PendingApproval> {
        self.take_where(|p| p.expires_at <= now)
    }

    pub fn drain(&mut self) -> Vec<PendingApproval> {
        self.take_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take_where<F>(&mut self, pred: F) -> Vec<PendingApproval>
    where
        F: Fn(&PendingApproval) -> bool,
    {
        let ids: Vec<ActionId> = self
            .entries
            .iter()
            .filter(|(_, p)| pred(p))
            .map(|(id, _)| *id)
            .collect();
        let mut taken: Vec<PendingApproval> = ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect();
        taken.sort_by_key(|p| p.request.submitted_at);
        taken
    }
}
