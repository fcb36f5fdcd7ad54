//! Run state machine: the exclusive owner of run transitions
//!
//! Every `status` and `current_step_index` change flows through here.
//! Steps execute strictly sequentially in snapshot order; the drive
//! loop keeps dispatching while the run stays `Running` and stops the
//! moment a gate suspends it or a step fails.
//!
//! Every persisted mutation carries the run version last read. Two
//! writers racing on one run (a duplicate gate submission against a
//! cancel, a scheduler tick against a resume) cannot both land: the
//! loser gets `ConcurrentModification` and must reload.

use crate::executor::NotificationSink;
use crate::handlers::{HandlerRegistry, StepOutcome};
use crate::store::Store;
use std::sync::Arc;
use workflow_types::{
    GateAction, GateResponse, RunStatus, StepDef, TriggeredBy, WorkflowError, WorkflowResult,
    WorkflowRun, WorkflowTemplate,
};

/// Drives workflow runs through their lifecycle
pub struct RunStateMachine {
    store: Arc<dyn Store>,
    registry: HandlerRegistry,
    notifier: Arc<dyn NotificationSink>,
}

impl RunStateMachine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: HandlerRegistry,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            registry,
            notifier,
        }
    }

    /// Create a run from a template and execute it until it completes,
    /// fails, or suspends at a gate.
    ///
    /// Rejects soft-deleted templates and templates with zero steps
    /// before any run record is created.
    pub async fn start_run(
        &self,
        template: &WorkflowTemplate,
        triggered_by: TriggeredBy,
    ) -> WorkflowResult<WorkflowRun> {
        if template.is_deleted() {
            return Err(WorkflowError::TemplateNotFound(template.id.clone()));
        }
        if template.steps.is_empty() {
            return Err(WorkflowError::EmptyTemplate(template.id.clone()));
        }

        let mut run = WorkflowRun::new(template, triggered_by);
        run.version = self.store.insert_run(&run).await?;

        tracing::info!(
            run_id = %run.id,
            template_id = %template.id,
            triggered_by = %run.triggered_by,
            "Workflow run started"
        );

        self.drive(&mut run).await?;
        Ok(run)
    }

    /// Cancel a run. Permitted only while running or paused; does not
    /// roll back side effects of already-completed steps.
    pub async fn cancel(&self, run: &mut WorkflowRun) -> WorkflowResult<()> {
        if !run.is_active() {
            return Err(WorkflowError::RunNotActive(run.id.clone()));
        }
        run.cancel();
        self.persist(run).await?;
        tracing::info!(run_id = %run.id, "Workflow run cancelled");
        Ok(())
    }

    /// Apply a validated gate response and resume execution.
    ///
    /// Precondition (checked by the gate resolver): the run is paused
    /// with `step` waiting at the current index and the response has
    /// passed gate-type validation.
    pub async fn apply_gate_response(
        &self,
        run: &mut WorkflowRun,
        step: &StepDef,
        response: GateResponse,
    ) -> WorkflowResult<()> {
        let action = response.action;
        let responded_by = response.responded_by.clone();
        run.record_gate_response(&step.id, response.clone());

        if action == GateAction::Reject {
            // A rejection halts the pipeline; the gate response on the
            // final step is what distinguishes it from a step failure.
            run.fail_step(&step.id, "gate rejected");
            run.fail(format!(
                "Gate '{}' rejected by {}",
                step.title, responded_by
            ));
            self.persist(run).await?;
            tracing::info!(
                run_id = %run.id,
                step_id = %step.id,
                "Gate rejected, run failed"
            );
            return Ok(());
        }

        run.complete_step(&step.id, response.to_output());
        run.resume();
        tracing::info!(
            run_id = %run.id,
            step_id = %step.id,
            action = ?action,
            "Gate resolved, run resumed"
        );

        if run.current_step_index + 1 == run.steps_snapshot.len() {
            run.complete();
            self.persist(run).await?;
            tracing::info!(run_id = %run.id, "Workflow run completed");
            return Ok(());
        }

        run.advance();
        self.persist(run).await?;
        self.drive(run).await
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Execute steps sequentially while the run stays `Running`
    async fn drive(&self, run: &mut WorkflowRun) -> WorkflowResult<()> {
        while run.status == RunStatus::Running {
            let Some(step) = run.current_step().cloned() else {
                break;
            };
            let context = run.context_through(run.current_step_index);

            run.mark_step_running(&step.id);
            self.persist(run).await?;

            let outcome = self.registry.dispatch(&step, &context, run).await;
            match outcome {
                StepOutcome::Completed(output) => {
                    run.complete_step(&step.id, output);
                    if run.current_step_index + 1 == run.steps_snapshot.len() {
                        run.complete();
                        self.persist(run).await?;
                        tracing::info!(run_id = %run.id, "Workflow run completed");
                    } else {
                        run.advance();
                        self.persist(run).await?;
                    }
                }
                StepOutcome::WaitingGate => {
                    run.mark_step_waiting_gate(&step.id);
                    run.pause();
                    self.persist(run).await?;
                    tracing::info!(
                        run_id = %run.id,
                        step_id = %step.id,
                        "Gate opened, run paused"
                    );
                    // Best effort: delivery failure never blocks the
                    // transition that already happened.
                    if let Err(e) = self.notifier.on_gate_opened(run, &step).await {
                        tracing::warn!(
                            run_id = %run.id,
                            step_id = %step.id,
                            error = %e,
                            "Gate notification failed"
                        );
                    }
                }
                StepOutcome::Failed(error) => {
                    let reason = error.to_string();
                    run.fail_step(&step.id, reason.clone());
                    run.fail(reason.clone());
                    self.persist(run).await?;
                    tracing::warn!(
                        run_id = %run.id,
                        step_id = %step.id,
                        error = %reason,
                        "Step failed, run failed"
                    );
                }
            }
        }
        Ok(())
    }

    /// Save with the optimistic version check and adopt the new version
    async fn persist(&self, run: &mut WorkflowRun) -> WorkflowResult<()> {
        run.version = self.store.save_run(run, run.version).await?;
        Ok(())
    }
}
