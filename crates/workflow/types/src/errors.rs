//! Error types for the workflow layer

use crate::{RunId, StepId, TemplateId};

/// Errors that can occur in workflow operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("Workflow run not found: {0}")]
    RunNotFound(RunId),

    #[error("Template has no steps: {0}")]
    EmptyTemplate(TemplateId),

    #[error("No eligible agent for step: {0}")]
    NoEligibleAgent(StepId),

    #[error("Gate mismatch for step '{step_id}': {reason}")]
    GateMismatch { step_id: StepId, reason: String },

    #[error("Invalid gate response: {0}")]
    InvalidGateResponse(String),

    #[error("Concurrent modification of run {run_id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        run_id: RunId,
        expected: u64,
        found: u64,
    },

    #[error("Step execution failed: {0}")]
    StepExecutionFailed(String),

    #[error("Run not active: {0}")]
    RunNotActive(RunId),

    #[error("Run already exists: {0}")]
    RunAlreadyExists(RunId),

    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),

    #[error("Workflow validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
