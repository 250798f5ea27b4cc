//! The contract between the pipeline and action logic.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use tablekeep_domain::{ActionRequest, DomainError, PatchError, SessionState};
use tablekeep_shared::rejection_codes;

/// Who contributed a handler or lifecycle registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerOwner {
    Core,
    Extension(String),
}

impl HandlerOwner {
    pub fn extension(id: impl Into<String>) -> Self {
        Self::Extension(id.into())
    }
}

impl fmt::Display for HandlerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOwner::Core => write!(f, "core"),
            HandlerOwner::Extension(id) => write!(f, "extension:{id}"),
        }
    }
}

/// User-facing validation failure, delivered to the submitter only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(rejection_codes::INVALID_PARAMETERS, message)
    }

    pub fn leader_only(action_type: &str) -> Self {
        Self::new(
            rejection_codes::LEADER_ONLY,
            format!("Only the session leader may perform '{action_type}'"),
        )
    }
}

impl From<DomainError> for ValidationError {
    fn from(err: DomainError) -> Self {
        let code = match &err {
            DomainError::Validation(_) | DomainError::Parse(_) => rejection_codes::INVALID_PARAMETERS,
            DomainError::NotFound { .. } => "not_found",
            DomainError::InvalidStateTransition(_) => "invalid_state",
        };
        Self::new(code, err.to_string())
    }
}

/// Bug-class failure inside `execute`; never shown to participants verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Validation and execution logic for one action type.
///
/// `validate` sees the current authoritative state and must not mutate
/// anything. `execute` mutates the shared draft; every handler registered
/// for the action type runs against the same draft in priority order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Suspend the request until the session leader approves it.
    fn requires_manual_approval(&self) -> bool {
        false
    }

    /// Reject non-leader submitters before `validate` runs.
    fn restricted_to_leader(&self) -> bool {
        false
    }

    /// Prompt shown to the leader when approval is required.
    fn approval_message(&self, _request: &ActionRequest) -> Option<String> {
        None
    }

    async fn validate(
        &self,
        request: &ActionRequest,
        state: &SessionState,
    ) -> Result<(), ValidationError>;

    async fn execute(
        &self,
        request: &ActionRequest,
        draft: &mut SessionState,
    ) -> Result<(), ExecuteError>;
}

/// A handler plus its ordering metadata.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub owner: HandlerOwner,
    /// Ascending: lower runs earlier
    pub priority: i32,
    pub handler: Arc<dyn ActionHandler>,
    pub(crate) seq: u64,
}

impl HandlerRegistration {
    pub fn new(owner: HandlerOwner, priority: i32, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            owner,
            priority,
            handler,
            seq: 0,
        }
    }

    pub fn core(handler: Arc<dyn ActionHandler>) -> Self {
        Self::new(HandlerOwner::Core, 0, handler)
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
