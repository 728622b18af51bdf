//! # Core Error Taxonomy
//!
//! Mirrors the kinds named in spec §7: admission, dispatch, worker,
//! timeout, conflict, fatal. Only admission errors are ever surfaced to
//! the HTTP layer; everything else is absorbed by the Scheduler as a
//! first-class step-machine state.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// The taxonomy tag attached to every log record involving an error
/// (spec §7 "Log records include the taxonomy tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Admission,
    Dispatch,
    Worker,
    Timeout,
    Conflict,
    Fatal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown workflow template '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow is invalid: {0}")]
    InvalidWorkflow(String),

    #[error("request not found: {0}")]
    RequestNotFound(uuid::Uuid),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(uuid::Uuid),

    #[error("idempotency conflict for user '{user_id}' key '{key}'")]
    IdempotencyConflict { user_id: String, key: String },

    #[error("store version conflict on entity {id}")]
    VersionConflict { id: uuid::Uuid },

    #[error("no healthy worker available for type '{0}'")]
    NoWorkerAvailable(String),

    #[error("bus port unavailable: {0}")]
    BusUnavailable(#[from] orchestrator_shared::OrchestratorError),

    #[error("dispatch saturated for worker type '{0}'")]
    Saturated(String),

    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownWorkflow(_)
            | Self::InvalidWorkflow(_)
            | Self::RequestNotFound(_)
            | Self::WorkflowNotFound(_)
            | Self::IdempotencyConflict { .. } => ErrorKind::Admission,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::NoWorkerAvailable(_) => ErrorKind::Dispatch,
            Self::BusUnavailable(_) => ErrorKind::Dispatch,
            Self::Saturated(_) => ErrorKind::Dispatch,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the scheduler should treat this as retryable rather than
    /// terminal. Conflict errors are always retried internally and never
    /// surfaced; dispatch errors leave the step `READY` for the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::Dispatch | ErrorKind::Timeout | ErrorKind::Worker
        )
    }
}
