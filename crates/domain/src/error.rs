//! Domain-level validation errors.

use thiserror::Error;

/// Errors raised by local validation before any remote call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A step index outside the quest's step list.
    #[error("quest {quest_id} has no step {step_index}")]
    StepOutOfRange { quest_id: String, step_index: usize },
}

impl DomainError {
    pub fn step_out_of_range(quest_id: impl Into<String>, step_index: usize) -> Self {
        Self::StepOutOfRange {
            quest_id: quest_id.into(),
            step_index,
        }
    }
}
