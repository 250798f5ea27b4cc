//! GM action pipeline.
//!
//! One task per session owns every mutation of that session's state. It
//! drains a command channel one command at a time:
//!
//! ```text
//! RECEIVED -> VALIDATING -> REJECTED
//!                        -> AWAITING_APPROVAL -> (decision) -> VALIDATING -> ...
//!                        -> EXECUTING -> APPLIED | FAILED
//! ```
//!
//! Requests that need the leader's approval are parked in a pending table
//! and the task moves on; the decision arrives later as its own command.
//! Readers load the authoritative state from an `ArcSwap` without going
//! through the task.

mod approvals;
#[cfg(test)]
pub(crate) mod testing;

pub use approvals::{PendingApproval, PendingApprovals};

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use tablekeep_domain::{
    ActionId, ActionRequest, Draft, ParticipantId, PatchOperation, SessionId, SessionState,
};
use tablekeep_shared::{rejection_codes, ServerMessage};

use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::ports::{ClockPort, SessionBroadcaster, SnapshotStore};
use crate::registry::{HandlerRegistration, HandlerRegistry, ValidationError};

const EXECUTION_FAILED_MESSAGE: &str = "The action could not be applied";
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Final (or interim) result of one submitted request.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Applied {
        new_version: u64,
        patches: Vec<PatchOperation>,
    },
    /// Parked until the leader decides
    AwaitingApproval,
    Rejected {
        code: String,
        message: String,
    },
    /// A handler failed during execution; nothing was applied
    Failed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Session pipeline {0} is no longer running")]
    Closed(SessionId),
    #[error("No pending approval for request {0}")]
    UnknownApproval(ActionId),
}

enum PipelineCommand {
    Submit {
        request: ActionRequest,
        reply: oneshot::Sender<ActionOutcome>,
    },
    Decide {
        request_id: ActionId,
        approved: bool,
        reason: Option<String>,
        reply: oneshot::Sender<Result<ActionOutcome, PipelineError>>,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
    },
    Shutdown {
        reply: oneshot::Sender<Arc<SessionState>>,
    },
}

/// Collaborators shared by every session pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub registry: Arc<HandlerRegistry>,
    pub broadcaster: Arc<dyn SessionBroadcaster>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn ClockPort>,
}

/// Cheap, cloneable entry point to a running session pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    session_id: SessionId,
    commands: mpsc::Sender<PipelineCommand>,
    state: Arc<ArcSwap<SessionState>>,
}

impl PipelineHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current authoritative state; never blocks on the pipeline task.
    pub fn snapshot(&self) -> Arc<SessionState> {
        self.state.load_full()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue a request and wait until the pipeline has processed it.
    ///
    /// Returns `AwaitingApproval` as soon as the request is parked; the
    /// final outcome reaches the submitter through the broadcaster.
    pub async fn submit(&self, request: ActionRequest) -> Result<ActionOutcome, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(PipelineCommand::Submit { request, reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    /// Deliver the leader's decision on a parked request.
    pub async fn decide(
        &self,
        request_id: ActionId,
        approved: bool,
        reason: Option<String>,
    ) -> Result<ActionOutcome, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(PipelineCommand::Decide {
            request_id,
            approved,
            reason,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Implicitly deny everything the participant still has pending.
    pub async fn participant_left(&self, participant_id: ParticipantId) -> Result<(), PipelineError> {
        self.send(PipelineCommand::ParticipantLeft { participant_id })
            .await
    }

    /// Stop the pipeline after the commands already queued, returning the final state.
    pub async fn shutdown(&self) -> Result<Arc<SessionState>, PipelineError> {
        let (reply, rx) = oneshot::channel();
        self.send(PipelineCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    async fn send(&self, command: PipelineCommand) -> Result<(), PipelineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| self.closed())
    }

    fn closed(&self) -> PipelineError {
        PipelineError::Closed(self.session_id)
    }
}

pub struct SessionPipeline {
    session_id: SessionId,
    state: Arc<ArcSwap<SessionState>>,
    deps: PipelineDeps,
    pending: PendingApprovals,
    config: PipelineConfig,
}

impl SessionPipeline {
    /// Start the pipeline task for `initial.session_id`.
    pub fn spawn(initial: SessionState, deps: PipelineDeps, config: PipelineConfig) -> PipelineHandle {
        let session_id = initial.session_id;
        let version = initial.version;
        let state = Arc::new(ArcSwap::from_pointee(initial));
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));

        let pipeline = Self {
            session_id,
            state: state.clone(),
            deps,
            pending: PendingApprovals::new(config.approval_timeout),
            config,
        };
        tokio::spawn(pipeline.run(rx));

        tracing::info!(session_id = %session_id, version, "Session pipeline started");

        PipelineHandle {
            session_id,
            commands: tx,
            state,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        let mut sweep = tokio::time::interval(self.config.approval_sweep.max(MIN_SWEEP_INTERVAL));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        // Every handle dropped.
                        self.deny_all_pending().await;
                        break;
                    };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                _ = sweep.tick() => self.expire_approvals().await,
            }
        }

        tracing::info!(
            session_id = %self.session_id,
            version = self.state.load().version,
            "Session pipeline stopped"
        );
    }

    async fn handle_command(&mut self, command: PipelineCommand) -> ControlFlow<()> {
        match command {
            PipelineCommand::Submit { request, reply } => {
                let outcome = self.submit(request).await;
                let _ = reply.send(outcome);
            }
            PipelineCommand::Decide {
                request_id,
                approved,
                reason,
                reply,
            } => {
                let result = self.decide(request_id, approved, reason).await;
                let _ = reply.send(result);
            }
            PipelineCommand::ParticipantLeft { participant_id } => {
                self.participant_left(participant_id);
            }
            PipelineCommand::Shutdown { reply } => {
                self.deny_all_pending().await;
                let _ = reply.send(self.state.load_full());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn submit(&mut self, request: ActionRequest) -> ActionOutcome {
        tracing::debug!(
            session_id = %self.session_id,
            request_id = %request.id,
            action = %request.action_type,
            submitter = %request.submitter.participant_id,
            "Action received"
        );

        // A reused id would displace the parked request without a decision.
        if self.pending.contains(request.id) {
            let err = ValidationError::new(
                rejection_codes::DUPLICATE_REQUEST,
                format!("Request {} is already awaiting approval", request.id),
            );
            return self.reject(&request, err).await;
        }

        let handlers = self.deps.registry.get_handlers(&request.action_type);
        if handlers.is_empty() {
            let err = ValidationError::new(
                rejection_codes::UNKNOWN_ACTION,
                format!("Unknown action '{}'", request.action_type),
            );
            return self.reject(&request, err).await;
        }

        let current = self.state.load_full();
        if let Err(err) = validate(&handlers, &request, &current).await {
            return self.reject(&request, err).await;
        }

        if handlers.iter().any(|r| r.handler.requires_manual_approval()) {
            return self.suspend(request, handlers).await;
        }

        self.execute(&request, &handlers).await
    }

    async fn suspend(
        &mut self,
        request: ActionRequest,
        handlers: Arc<[HandlerRegistration]>,
    ) -> ActionOutcome {
        let message = handlers
            .iter()
            .find_map(|r| r.handler.approval_message(&request))
            .unwrap_or_else(|| format!("Approve '{}'?", request.action_type));

        let approval_request = ServerMessage::ApprovalRequired {
            request_id: request.id,
            session_id: self.session_id,
            action: request.action_type.clone(),
            submitter_id: request.submitter.participant_id,
            message,
        };
        let acknowledgement = ServerMessage::ApprovalPending {
            request_id: request.id,
        };
        let submitter = request.submitter.participant_id;

        tracing::info!(
            session_id = %self.session_id,
            request_id = %request.id,
            action = %request.action_type,
            "Action awaiting leader approval"
        );
        self.pending.insert(request, handlers, self.deps.clock.now());

        self.deps
            .broadcaster
            .send_to_leader(self.session_id, approval_request)
            .await;
        self.deps
            .broadcaster
            .send_to_participant(self.session_id, submitter, acknowledgement)
            .await;

        ActionOutcome::AwaitingApproval
    }

    async fn decide(
        &mut self,
        request_id: ActionId,
        approved: bool,
        reason: Option<String>,
    ) -> Result<ActionOutcome, PipelineError> {
        let pending = self
            .pending
            .remove(request_id)
            .ok_or(PipelineError::UnknownApproval(request_id))?;

        if !approved {
            let message =
                reason.unwrap_or_else(|| "The session leader denied this action".to_string());
            let err = ValidationError::new(rejection_codes::APPROVAL_DENIED, message);
            return Ok(self.reject(&pending.request, err).await);
        }

        // State may have moved on while the request waited.
        let current = self.state.load_full();
        if let Err(err) = validate(&pending.handlers, &pending.request, &current).await {
            return Ok(self.reject(&pending.request, err).await);
        }

        Ok(self.execute(&pending.request, &pending.handlers).await)
    }

    async fn execute(
        &mut self,
        request: &ActionRequest,
        handlers: &[HandlerRegistration],
    ) -> ActionOutcome {
        let base = self.state.load_full();
        let mut draft = Draft::new(&base);

        for (index, registration) in handlers.iter().enumerate() {
            if let Err(error) = registration
                .handler
                .execute(request, draft.state_mut())
                .await
            {
                tracing::error!(
                    session_id = %self.session_id,
                    request_id = %request.id,
                    action = %request.action_type,
                    owner = %registration.owner,
                    handler_index = index,
                    error = %error,
                    "Action execution failed"
                );
                return self.fail(request).await;
            }
        }

        draft.state_mut().version = base.version + 1;
        let produced = match draft.finish() {
            Ok(produced) => produced,
            Err(error) => {
                tracing::error!(
                    session_id = %self.session_id,
                    request_id = %request.id,
                    action = %request.action_type,
                    error = %error,
                    "Failed to produce patches for action"
                );
                return self.fail(request).await;
            }
        };

        let new_version = produced.state.version;
        let new_state = Arc::new(produced.state);
        self.state.store(new_state.clone());

        tracing::info!(
            session_id = %self.session_id,
            request_id = %request.id,
            action = %request.action_type,
            new_version,
            patch_count = produced.patches.len(),
            "Action applied"
        );

        self.deps
            .broadcaster
            .broadcast(
                self.session_id,
                ServerMessage::StatePatch {
                    session_id: self.session_id,
                    patches: produced.patches.clone(),
                    base_version: base.version,
                    new_version,
                },
            )
            .await;

        if self.config.checkpoint_actions.contains(&request.action_type) {
            self.checkpoint(&new_state).await;
        }

        ActionOutcome::Applied {
            new_version,
            patches: produced.patches,
        }
    }

    async fn reject(&self, request: &ActionRequest, err: ValidationError) -> ActionOutcome {
        tracing::debug!(
            session_id = %self.session_id,
            request_id = %request.id,
            action = %request.action_type,
            code = %err.code,
            "Action rejected"
        );
        self.deps
            .broadcaster
            .send_to_participant(
                self.session_id,
                request.submitter.participant_id,
                ServerMessage::rejected(request.id, err.code.clone(), err.message.clone()),
            )
            .await;
        ActionOutcome::Rejected {
            code: err.code,
            message: err.message,
        }
    }

    async fn fail(&self, request: &ActionRequest) -> ActionOutcome {
        self.deps
            .broadcaster
            .send_to_participant(
                self.session_id,
                request.submitter.participant_id,
                ServerMessage::rejected(
                    request.id,
                    rejection_codes::EXECUTION_FAILED,
                    EXECUTION_FAILED_MESSAGE,
                ),
            )
            .await;
        ActionOutcome::Failed
    }

    async fn checkpoint(&self, state: &SessionState) {
        match self.deps.snapshots.save(state).await {
            Ok(()) => tracing::debug!(
                session_id = %self.session_id,
                version = state.version,
                "Session snapshot checkpointed"
            ),
            Err(error) => tracing::error!(
                session_id = %self.session_id,
                version = state.version,
                error = %error,
                "Failed to checkpoint session snapshot"
            ),
        }
    }

    fn participant_left(&mut self, participant_id: ParticipantId) {
        let dropped = self.pending.remove_by_submitter(participant_id);
        if !dropped.is_empty() {
            tracing::info!(
                session_id = %self.session_id,
                participant_id = %participant_id,
                dropped = dropped.len(),
                "Dropped pending approvals of departed participant"
            );
        }
    }

    async fn expire_approvals(&mut self) {
        let expired = self.pending.take_expired(self.deps.clock.now());
        for pending in expired {
            tracing::info!(
                session_id = %self.session_id,
                request_id = %pending.request.id,
                action = %pending.request.action_type,
                "Approval request expired"
            );
            let err = ValidationError::new(
                rejection_codes::APPROVAL_EXPIRED,
                "The session leader did not respond in time",
            );
            self.reject(&pending.request, err).await;
        }
    }

    async fn deny_all_pending(&mut self) {
        for pending in self.pending.drain() {
            let err = ValidationError::new(
                rejection_codes::APPROVAL_DENIED,
                "The session ended before the leader decided",
            );
            self.reject(&pending.request, err).await;
        }
    }
}

/// Run every handler's checks in priority order; first failure wins.
async fn validate(
    handlers: &[HandlerRegistration],
    request: &ActionRequest,
    state: &SessionState,
) -> Result<(), ValidationError> {
    for registration in handlers {
        if registration.handler.restricted_to_leader() && !request.submitter.is_leader {
            return Err(ValidationError::leader_only(&request.action_type));
        }
        registration.handler.validate(request, state).await?;
    }
    Ok(())
}
