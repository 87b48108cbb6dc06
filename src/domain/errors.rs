//! Domain errors for the scheduling engine.

use thiserror::Error;
use uuid::Uuid;

/// Format a list of task ids as a human-readable string: `A, B, C`.
fn format_id_list(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Domain-level errors.
///
/// Expected races (cancelling an unknown task, releasing an unknown agent)
/// are deliberately *not* errors; those surface as boolean failures or
/// no-ops at the service layer.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Planner defect: tasks never placed in any layer: {}", format_id_list(.0))]
    UnplannedTasks(Vec<Uuid>),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
