//! Workflow error taxonomy. Validation, authorization and state errors
//! abort before any mutation; persistence errors abort before commit;
//! event-delivery failures are logged by the bus and never surface here.

use crate::types::{Direction, Stage};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // ── Validation ──
    #[error("invalid direction: expected IN or OUT")]
    InvalidDirection,

    #[error("stage {stage} is not part of the {direction} sequence")]
    UnknownStage { direction: Direction, stage: Stage },

    #[error("invalid deadline: {reason}")]
    InvalidDeadline { reason: String },

    #[error("skip reason must be at least {min} characters")]
    InvalidReason { min: usize },

    #[error("invalid decree target: {reason}")]
    InvalidTarget { reason: String },

    // ── Authorization ──
    #[error("only an administrator may perform this operation")]
    Unauthorized,

    // ── State ──
    #[error("document {document_id} is already archived")]
    AlreadyTerminal { document_id: uuid::Uuid },

    #[error("document {document_id} was modified concurrently; retry the operation")]
    ConcurrentModification { document_id: uuid::Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: uuid::Uuid },

    // ── Infrastructure ──
    #[error("persistence failure")]
    Persistence(#[source] anyhow::Error),
}

impl WorkflowError {
    /// True for caller-input problems (as opposed to state or infrastructure).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidDirection
                | WorkflowError::UnknownStage { .. }
                | WorkflowError::InvalidDeadline { .. }
                | WorkflowError::InvalidReason { .. }
                | WorkflowError::InvalidTarget { .. }
        )
    }
}
