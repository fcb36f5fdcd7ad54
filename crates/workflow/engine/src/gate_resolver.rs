//! Gate resolver: feeds asynchronous human responses back into a
//! paused run
//!
//! The resolver checks that a response targets the gate the run is
//! actually waiting on, validates it against the gate's type, and
//! hands it to the state machine. It never flips run status itself.
//!
//! The precondition check is what makes resolution idempotent-safe: a
//! duplicate submission finds the run no longer paused (or the step no
//! longer waiting) and is rejected with `GateMismatch` before anything
//! mutates.

use crate::state_machine::RunStateMachine;
use crate::store::Store;
use std::sync::Arc;
use workflow_types::{
    GateAction, GateResponse, GateType, RunId, RunStatus, StepDef, StepId, StepStatus,
    WorkflowError, WorkflowResult, WorkflowRun,
};

/// Resolves human gate responses against paused runs
pub struct GateResolver {
    store: Arc<dyn Store>,
    state_machine: Arc<RunStateMachine>,
}

impl GateResolver {
    pub fn new(store: Arc<dyn Store>, state_machine: Arc<RunStateMachine>) -> Self {
        Self {
            store,
            state_machine,
        }
    }

    /// Resolve the gate a run is waiting on.
    ///
    /// Validation failures reject synchronously and never mutate run
    /// state. On success the state machine records the response and
    /// either resumes execution or, for a rejection, fails the run.
    pub async fn resolve(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        response: GateResponse,
    ) -> WorkflowResult<()> {
        let mut run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))?;

        let step = Self::check_preconditions(&run, step_id)?.clone();
        Self::validate(&step, &response)?;

        self.state_machine
            .apply_gate_response(&mut run, &step, response)
            .await
    }

    /// The step the run is waiting on, or why this submission is stale
    fn check_preconditions<'a>(
        run: &'a WorkflowRun,
        step_id: &StepId,
    ) -> WorkflowResult<&'a StepDef> {
        if run.status != RunStatus::Paused {
            return Err(WorkflowError::GateMismatch {
                step_id: step_id.clone(),
                reason: format!("run is not paused (status {:?})", run.status),
            });
        }

        let Some(current) = run.current_step() else {
            return Err(WorkflowError::GateMismatch {
                step_id: step_id.clone(),
                reason: "run has no current step".into(),
            });
        };
        if &current.id != step_id {
            return Err(WorkflowError::GateMismatch {
                step_id: step_id.clone(),
                reason: format!("run is waiting on step '{}'", current.id),
            });
        }

        let waiting = run
            .result_for(step_id)
            .map(|r| r.status == StepStatus::WaitingGate)
            .unwrap_or(false);
        if !waiting {
            return Err(WorkflowError::GateMismatch {
                step_id: step_id.clone(),
                reason: "step is not waiting on a gate".into(),
            });
        }

        Ok(current)
    }

    /// Validate a response against the gate's type
    fn validate(step: &StepDef, response: &GateResponse) -> WorkflowResult<()> {
        let Some((gate_type, gate_options)) = step.gate_config() else {
            return Err(WorkflowError::GateMismatch {
                step_id: step.id.clone(),
                reason: "step is not a human gate".into(),
            });
        };

        match gate_type {
            GateType::Approve => {
                if !matches!(response.action, GateAction::Approve | GateAction::Reject) {
                    return Err(WorkflowError::InvalidGateResponse(
                        "approve gate expects approve or reject".into(),
                    ));
                }
            }
            GateType::Select => {
                if response.action != GateAction::Select {
                    return Err(WorkflowError::InvalidGateResponse(
                        "select gate expects a selection".into(),
                    ));
                }
                if response.selected_options.is_empty() {
                    return Err(WorkflowError::InvalidGateResponse(
                        "selection must not be empty".into(),
                    ));
                }
                // Declared options constrain the selection; an empty
                // declaration accepts any choice sourced upstream.
                if !gate_options.is_empty() {
                    if let Some(unknown) = response
                        .selected_options
                        .iter()
                        .find(|&o| !gate_options.contains(o))
                    {
                        return Err(WorkflowError::InvalidGateResponse(format!(
                            "'{}' is not one of the gate options",
                            unknown
                        )));
                    }
                }
            }
            GateType::Input => {
                if response.action != GateAction::Input {
                    return Err(WorkflowError::InvalidGateResponse(
                        "input gate expects text input".into(),
                    ));
                }
                let has_text = response
                    .input_text
                    .as_deref()
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false);
                if !has_text {
                    return Err(WorkflowError::InvalidGateResponse(
                        "input text must not be empty".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_types::{StepDef, UserId};

    fn response(action: GateAction) -> GateResponse {
        GateResponse {
            action,
            selected_options: Vec::new(),
            input_text: None,
            responded_by: UserId::new("u-1"),
            responded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_approve_gate_accepts_approve_and_reject() {
        let step = StepDef::human_gate("gate", "Approve", GateType::Approve);
        assert!(GateResolver::validate(&step, &response(GateAction::Approve)).is_ok());
        assert!(GateResolver::validate(&step, &response(GateAction::Reject)).is_ok());
        assert!(matches!(
            GateResolver::validate(&step, &response(GateAction::Select)),
            Err(WorkflowError::InvalidGateResponse(_))
        ));
    }

    #[test]
    fn test_select_gate_constrains_to_declared_options() {
        let step = StepDef::human_gate("gate", "Pick", GateType::Select)
            .with_gate_options(vec!["X".into(), "Y".into()]);

        let valid = GateResponse::select(vec!["X".into()], UserId::new("u-1"));
        assert!(GateResolver::validate(&step, &valid).is_ok());

        let unknown = GateResponse::select(vec!["Z".into()], UserId::new("u-1"));
        assert!(matches!(
            GateResolver::validate(&step, &unknown),
            Err(WorkflowError::InvalidGateResponse(_))
        ));

        let empty = GateResponse::select(vec![], UserId::new("u-1"));
        assert!(matches!(
            GateResolver::validate(&step, &empty),
            Err(WorkflowError::InvalidGateResponse(_))
        ));
    }

    #[test]
    fn test_select_gate_without_options_accepts_any_choice() {
        let step = StepDef::human_gate("gate", "Pick", GateType::Select);
        let upstream = GateResponse::select(vec!["From upstream".into()], UserId::new("u-1"));
        assert!(GateResolver::validate(&step, &upstream).is_ok());
    }

    #[test]
    fn test_input_gate_requires_text() {
        let step = StepDef::human_gate("gate", "Describe", GateType::Input);

        let valid = GateResponse::input("looks good", UserId::new("u-1"));
        assert!(GateResolver::validate(&step, &valid).is_ok());

        let blank = GateResponse::input("   ", UserId::new("u-1"));
        assert!(matches!(
            GateResolver::validate(&step, &blank),
            Err(WorkflowError::InvalidGateResponse(_))
        ));

        assert!(matches!(
            GateResolver::validate(&step, &response(GateAction::Input)),
            Err(WorkflowError::InvalidGateResponse(_))
        ));
    }
}
