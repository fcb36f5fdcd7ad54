//! The engine facade: the only surface other subsystems call
//!
//! Composes the store, the handler registry, the run state machine,
//! and the gate resolver behind four operations: start a run, resolve
//! a gate, cancel a run, list active runs.

use crate::executor::{AgentDirectory, NotificationSink, TaskExecutor};
use crate::gate_resolver::GateResolver;
use crate::handlers::HandlerRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::state_machine::RunStateMachine;
use crate::store::Store;
use std::sync::Arc;
use workflow_types::{
    AccountId, GateResponse, RunId, StepId, TemplateId, TriggeredBy, WorkflowError,
    WorkflowResult, WorkflowRun,
};

/// The Workflow Run Engine
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    state_machine: Arc<RunStateMachine>,
    gate_resolver: GateResolver,
}

impl WorkflowEngine {
    /// Assemble an engine over its collaborators
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<dyn TaskExecutor>,
        directory: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let registry = HandlerRegistry::new(directory, executor);
        let state_machine = Arc::new(RunStateMachine::new(store.clone(), registry, notifier));
        let gate_resolver = GateResolver::new(store.clone(), state_machine.clone());
        Self {
            store,
            state_machine,
            gate_resolver,
        }
    }

    /// Start a run of a template, from the scheduler or a user's
    /// "Run Now". Executes until the run completes, fails, or suspends
    /// at a gate; returns the run id either way.
    pub async fn start_run(
        &self,
        template_id: &TemplateId,
        triggered_by: TriggeredBy,
    ) -> WorkflowResult<RunId> {
        let template = self
            .store
            .get_template(template_id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or_else(|| WorkflowError::TemplateNotFound(template_id.clone()))?;

        let run = self.state_machine.start_run(&template, triggered_by).await?;
        Ok(run.id)
    }

    /// Feed a human response into the gate a run is waiting on
    pub async fn resolve_gate(
        &self,
        run_id: &RunId,
        step_id: &StepId,
        response: GateResponse,
    ) -> WorkflowResult<()> {
        self.gate_resolver.resolve(run_id, step_id, response).await
    }

    /// Cancel a running or paused run
    pub async fn cancel_run(&self, run_id: &RunId) -> WorkflowResult<()> {
        let mut run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))?;
        self.state_machine.cancel(&mut run).await
    }

    /// Runs currently in flight (running or paused) for an account
    pub async fn list_active_runs(
        &self,
        account_id: &AccountId,
    ) -> WorkflowResult<Vec<WorkflowRun>> {
        self.store.list_active_runs(account_id).await
    }

    /// Fetch one run, for inspection
    pub async fn get_run(&self, run_id: &RunId) -> WorkflowResult<WorkflowRun> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::RunNotFound(run_id.clone()))
    }

    /// Build a scheduler that starts due runs through this engine's
    /// state machine
    pub fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(config, self.store.clone(), self.state_machine.clone())
    }
}
