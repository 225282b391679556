//! Service layer error types
//!
//! `ServiceError` covers remote-call failures at the port boundary;
//! `QuestFlowError` is the controller's full taxonomy, including the local
//! checks that short-circuit before any remote call is issued.

use questlab_domain::{DomainError, QuestId, UserId};
use thiserror::Error;

/// Errors produced by remote service calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Request never completed (network failure, timeout, cancelled).
    #[error("request failed: {0}")]
    Transport(String),

    /// Service answered with a non-success status.
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Response arrived but did not match the expected schema.
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Whether a retry can plausibly succeed. Client errors other than
    /// throttling are contract violations and retrying them only repeats
    /// the mistake.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(_) => true,
            ServiceError::Status { status, .. } => *status >= 500 || *status == 429,
            ServiceError::InvalidResponse(_) => true,
        }
    }
}

/// Errors observable at the controller boundary.
///
/// Every variant is also recorded in the activity log at the point of
/// failure; callers that only watch the log can treat an `Err` as already
/// reported.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuestFlowError {
    /// A remote call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Simulation was requested for a step that declares no event type;
    /// such steps can only be completed manually.
    #[error("step {step_index} of quest {quest_id} has no event type - use manual completion instead")]
    InvalidStep { quest_id: QuestId, step_index: usize },

    /// A required identifier was missing before the operation.
    #[error("{0} is required before this operation")]
    Precondition(&'static str),

    /// A simulation for the same (quest, user) pair is already in flight.
    #[error("a simulation is already running for quest {quest_id} and user {user_id}")]
    Busy { quest_id: QuestId, user_id: UserId },

    /// Local validation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}
